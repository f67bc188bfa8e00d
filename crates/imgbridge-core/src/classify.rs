//! Format classification from a name or URL suffix.

use reqwest::Url;

/// Extension used when the input carries no suffix.
pub const DEFAULT_EXTENSION: &str = "jpg";

const MAX_EXTENSION_LEN: usize = 10;

/// Extension of the encoding that must be normalized before upload.
pub const WEBP_EXTENSION: &str = "webp";

/// Extension written by normalization.
pub const NORMALIZED_EXTENSION: &str = "jpg";

/// Infer an extension from a URL or bare path.
///
/// URLs are classified by their path only, so query strings and fragments
/// never leak into the result.
pub fn classify(name_or_url: &str) -> String {
    suffix(name_or_url).unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Whether the name or URL carries an explicit suffix.
pub fn has_extension(name_or_url: &str) -> bool {
    suffix(name_or_url).is_some()
}

fn suffix(name_or_url: &str) -> Option<String> {
    let path = match Url::parse(name_or_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => name_or_url.to_string(),
    };

    let last_segment = path.rsplit(['/', '\\']).next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((_, ext)) if is_plain_extension(ext) => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Extensions end up in artifact names, so only short alphanumeric runs count.
fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn needs_normalization(extension: &str) -> bool {
    extension.eq_ignore_ascii_case(WEBP_EXTENSION)
}

/// Check for the `RIFF....WEBP` container signature.
pub fn is_webp_signature(header: &[u8]) -> bool {
    header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP"
}

/// Content type sent with the upload part.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
