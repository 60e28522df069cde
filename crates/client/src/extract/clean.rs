//! Preview post-processing.

use hntop_core::PreviewMetadata;
use url::Url;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const SITE_NAME_MAX_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve an image reference to an absolute http(s) URL.
///
/// Absolute http(s) values are kept, root-relative paths are joined onto the
/// page URL, everything else is dropped.
fn resolve_image(image: &str, page_url: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(image) {
        return matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string());
    }

    if image.starts_with('/') {
        let base = Url::parse(page_url).ok()?;
        return base.join(image).ok().map(|u| u.to_string());
    }

    None
}

/// Trim text fields and validate the image reference.
///
/// Whitespace-only values become `None`.
pub fn clean_preview(mut preview: PreviewMetadata) -> PreviewMetadata {
    preview.title = trimmed(preview.title);
    preview.description = trimmed(preview.description);
    preview.site_name = trimmed(preview.site_name);
    preview.image = trimmed(preview.image).and_then(|image| resolve_image(&image, &preview.url));
    preview
}

/// Cut `value` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return ELLIPSIS.to_string();
    }

    let mut out: String = value.chars().take(max_chars - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Apply the 200/500/100 character limits to title, description and site name.
pub fn truncate_preview(mut preview: PreviewMetadata) -> PreviewMetadata {
    preview.title = preview.title.map(|v| truncate_chars(&v, TITLE_MAX_CHARS));
    preview.description = preview.description.map(|v| truncate_chars(&v, DESCRIPTION_MAX_CHARS));
    preview.site_name = preview.site_name.map(|v| truncate_chars(&v, SITE_NAME_MAX_CHARS));
    preview
}
