//! OpenGraph preview extraction.
//!
//! ### Single Pass
//! - Walks the parsed document once, in document order.
//! - Collects `og:title`, `og:description`, `og:image`, `og:site_name` from
//!   `<meta property=... content=...>`; the first non-empty value of each wins.
//! - Collects the `<title>` text and `<meta name="description">` during the
//!   same walk as fallbacks.
//!
//! ### Priority
//! - A non-empty OpenGraph value always beats its fallback, wherever the two
//!   appear in the document.
//!
//! ### Post-processing
//! - See [`clean`]: trimming, image validation, optional truncation.

pub mod clean;

pub use clean::{clean_preview, truncate_chars, truncate_preview};

use hntop_core::PreviewMetadata;
use scraper::{ElementRef, Html};

#[derive(Debug, Default)]
struct Collected {
    og_title: Option<String>,
    og_description: Option<String>,
    og_image: Option<String>,
    og_site_name: Option<String>,
    title_tag: Option<String>,
    meta_description: Option<String>,
}

fn keep_first(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !value.trim().is_empty() {
        *slot = Some(value.to_string());
    }
}

/// Extract raw preview metadata from an HTML document.
///
/// Values are returned as found; run [`clean_preview`] before storing them.
pub fn extract_preview(html: &str, url: &str) -> PreviewMetadata {
    let document = Html::parse_document(html);
    let mut found = Collected::default();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };

        match element.value().name() {
            "meta" => {
                let attrs = element.value();
                let content = attrs.attr("content").unwrap_or_default();

                match attrs.attr("property") {
                    Some("og:title") => keep_first(&mut found.og_title, content),
                    Some("og:description") => keep_first(&mut found.og_description, content),
                    Some("og:image") => keep_first(&mut found.og_image, content),
                    Some("og:site_name") => keep_first(&mut found.og_site_name, content),
                    _ => {}
                }

                if attrs.attr("name").is_some_and(|name| name.eq_ignore_ascii_case("description")) {
                    keep_first(&mut found.meta_description, content);
                }
            }
            "title" if found.title_tag.is_none() => {
                let text: String = element.text().collect();
                keep_first(&mut found.title_tag, &text);
            }
            _ => {}
        }
    }

    tracing::trace!(url, og_title = found.og_title.is_some(), title_tag = found.title_tag.is_some(), "scanned document");

    PreviewMetadata {
        url: url.to_string(),
        title: found.og_title.or(found.title_tag),
        description: found.og_description.or(found.meta_description),
        image: found.og_image,
        site_name: found.og_site_name,
    }
}
