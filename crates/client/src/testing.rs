//! Throwaway HTTP/1.1 responder for tests.
//!
//! Binds `127.0.0.1:0`, answers every connection with one response and
//! closes it. Records request heads, arrival times and peak concurrency.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub(crate) struct TestResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub location: Option<String>,
    pub delay: Option<Duration>,
}

impl TestResponse {
    pub fn ok(content_type: &str, body: &str) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body: body.to_string(),
            location: None,
            delay: None,
        }
    }

    pub fn html(body: &str) -> Self {
        Self::ok("text/html; charset=utf-8", body)
    }

    pub fn json(body: &str) -> Self {
        Self::ok("application/json", body)
    }

    pub fn status(status: u16) -> Self {
        Self { status, content_type: "text/plain".to_string(), body: String::new(), location: None, delay: None }
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self { location: Some(location.to_string()), ..Self::status(302) }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Handler = dyn Fn(&str) -> TestResponse + Send + Sync;

#[derive(Default)]
struct Recorded {
    requests: Mutex<Vec<String>>,
    arrivals: Mutex<Vec<Instant>>,
}

pub(crate) struct TestServer {
    pub addr: SocketAddr,
    /// Requests answered so far.
    pub hits: Arc<AtomicUsize>,
    /// Highest number of requests being handled at the same time.
    pub max_in_flight: Arc<AtomicUsize>,
    recorded: Arc<Recorded>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(handler: impl Fn(&str) -> TestResponse + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let hits = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::new(Recorded::default());

        let task = {
            let hits = hits.clone();
            let max_in_flight = max_in_flight.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let handler = handler.clone();
                    let hits = hits.clone();
                    let in_flight = in_flight.clone();
                    let max_in_flight = max_in_flight.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        let mut stream = stream;
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);

                        let head = read_head(&mut stream).await;
                        recorded.arrivals.lock().unwrap().push(Instant::now());
                        let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                        recorded.requests.lock().unwrap().push(head);

                        let response = handler(&path);
                        if let Some(delay) = response.delay {
                            tokio::time::sleep(delay).await;
                        }

                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        hits.fetch_add(1, Ordering::SeqCst);
                        write_response(stream, &response).await;
                    });
                }
            })
        };

        Self { addr, hits, max_in_flight, recorded, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Raw request heads, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.recorded.requests.lock().unwrap().clone()
    }

    pub fn arrivals(&self) -> Vec<Instant> {
        self.recorded.arrivals.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn write_response(mut stream: TcpStream, response: &TestResponse) {
    let location = response.location.as_ref().map(|l| format!("Location: {l}\r\n")).unwrap_or_default();
    let head = format!(
        "HTTP/1.1 {} TEST\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len(),
        location
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(response.body.as_bytes()).await;
    let _ = stream.shutdown().await;
}
