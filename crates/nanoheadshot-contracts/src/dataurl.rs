use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Encodes raw bytes as a `data:<mime>;base64,<payload>` string.
pub fn encode_data_url(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Parses a `data:<mime>;base64,<payload>` string back into its MIME type
/// and raw bytes.
///
/// Parsing is strict: anything that does not match the full pattern is
/// rejected with a format error, never truncated or partially decoded.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    let trimmed = data_url.trim();
    let Some(rest) = trimmed.strip_prefix("data:") else {
        bail!("not a data URL (missing 'data:' prefix)");
    };
    let Some((mime_type, payload)) = rest.split_once(";base64,") else {
        bail!("not a base64 data URL (missing ';base64,' marker)");
    };
    if mime_type.is_empty() {
        bail!("data URL has an empty MIME type");
    }
    let bytes = BASE64
        .decode(payload.as_bytes())
        .context("data URL payload is not valid base64")?;
    Ok((mime_type.to_string(), bytes))
}

/// Extension-based MIME lookup for the image formats the product accepts.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{decode_data_url, encode_data_url, mime_for_path};

    #[test]
    fn encode_then_decode_round_trips() -> anyhow::Result<()> {
        let bytes = vec![0x89u8, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
        let data_url = encode_data_url(&bytes, "image/png");
        assert!(data_url.starts_with("data:image/png;base64,"));

        let (mime_type, decoded) = decode_data_url(&data_url)?;
        assert_eq!(mime_type, "image/png");
        assert_eq!(decoded, bytes);
        Ok(())
    }

    #[test]
    fn decode_accepts_known_literal() -> anyhow::Result<()> {
        let (mime_type, bytes) = decode_data_url("data:image/png;base64,AAAA")?;
        assert_eq!(mime_type, "image/png");
        assert_eq!(bytes, vec![0u8, 0, 0]);
        Ok(())
    }

    #[test]
    fn decode_rejects_malformed_inputs() {
        let cases = [
            "",
            "image/png;base64,AAAA",
            "data:image/png,AAAA",
            "data:;base64,AAAA",
            "data:image/png;base64,not//valid##base64",
            "https://example.com/image.png",
        ];
        for case in cases {
            assert!(decode_data_url(case).is_err(), "accepted: {case:?}");
        }
    }

    #[test]
    fn mime_lookup_covers_accepted_extensions() {
        assert_eq!(mime_for_path(Path::new("a.png")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(mime_for_path(Path::new("a.gif")), Some("image/gif"));
        assert_eq!(mime_for_path(Path::new("a.tiff")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
    }
}
