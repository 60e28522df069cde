//! Fetch target parsing and the per-domain pacing key.

use hntop_core::Error;
use url::Url;

/// Parse a fetch target.
///
/// Steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an explicit http or https scheme and a host
/// 3. Drop the fragment (never sent on the wire)
///
/// The query string is kept as-is.
pub fn parse_target(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl(format!("missing host: {trimmed}")));
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Pacing key for a target: lowercase host, plus the port when one is given explicitly.
pub fn domain_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}
