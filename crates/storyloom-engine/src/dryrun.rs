use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::endpoint::{ContentPart, EndpointError, ImageCall, ImageEndpoint, TextCall, TextEndpoint};

const LONG_SIDE: u32 = 160;

/// Offline endpoint: solid-colour PNGs and canned text, derived from the
/// prompt so runs are reproducible.
#[derive(Debug, Default)]
pub struct DryrunEndpoint {
    calls: AtomicU64,
}

impl DryrunEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_call(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::SeqCst)
    }
}

fn dims_from_aspect_ratio(aspect_ratio: &str) -> (u32, u32) {
    let parsed = aspect_ratio
        .split_once(':')
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)))
        .filter(|(w, h)| *w > 0 && *h > 0);
    let Some((w, h)) = parsed else {
        return (LONG_SIDE, LONG_SIDE);
    };
    if w >= h {
        (LONG_SIDE, (LONG_SIDE * h / w).max(1))
    } else {
        ((LONG_SIDE * w / h).max(1), LONG_SIDE)
    }
}

fn color_from_prompt(prompt: &str, idx: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..4])
}

fn encode_png(width: u32, height: u32, color: (u8, u8, u8)) -> Result<Vec<u8>, EndpointError> {
    let (r, g, b) = color;
    let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| EndpointError::other(format!("dryrun png encode failed: {err}")))?;
    Ok(cursor.into_inner())
}

impl ImageEndpoint for DryrunEndpoint {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_image(&self, call: &ImageCall) -> Result<Vec<ContentPart>, EndpointError> {
        let idx = self.next_call();
        let (width, height) = dims_from_aspect_ratio(&call.aspect_ratio);
        let bytes = encode_png(width, height, color_from_prompt(&call.prompt, idx))?;
        Ok(vec![ContentPart::InlineData {
            mime_type: Some("image/png".to_string()),
            data: BASE64.encode(bytes),
        }])
    }
}

impl TextEndpoint for DryrunEndpoint {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_text(&self, call: &TextCall) -> Result<String, EndpointError> {
        self.next_call();
        let first_line = call
            .prompt
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        Ok(format!(
            "[dryrun {}] {}",
            short_id(&call.prompt),
            crate::truncate_text(first_line, 120)
        ))
    }
}
