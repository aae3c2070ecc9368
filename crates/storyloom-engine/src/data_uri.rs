use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

pub fn to_data_uri(mime_type: Option<&str>, data: &str) -> String {
    let mime = mime_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MIME);
    format!("data:{mime};base64,{data}")
}

/// Splits a base64 data URI into its mime type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = uri.strip_prefix("data:") else {
        bail!("not a data URI");
    };
    let Some((header, payload)) = rest.split_once(',') else {
        bail!("data URI has no payload separator");
    };
    let Some(mime) = header.strip_suffix(";base64") else {
        bail!("data URI is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .context("data URI base64 decode failed")?;
    let mime = if mime.is_empty() {
        DEFAULT_IMAGE_MIME.to_string()
    } else {
        mime.to_string()
    };
    Ok((mime, bytes))
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}
