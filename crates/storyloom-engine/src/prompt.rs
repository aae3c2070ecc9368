use sha2::{Digest, Sha256};
use storyloom_contracts::styles::{ContentRating, ImageStyle};

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

pub const IMAGE_DIRECTIVE: &str = "Generate the image now. Reply with the image only, \
without any accompanying text, questions or commentary.";

/// Builds the text sent to the image model. Pure: the same inputs always give
/// the same bytes.
pub fn compose_image_prompt(scene: &str, style: ImageStyle, rating: ContentRating) -> String {
    format!(
        "Create an illustration for a scene in a novel.\n\
         Art style: {style_label}, {style_phrase}.\n\
         Scene: {scene}\n\
         Content guidelines: {rating_phrase}.\n\
         {directive}",
        style_label = style.label(),
        style_phrase = style.phrase(),
        scene = scene.trim(),
        rating_phrase = rating.phrase(),
        directive = IMAGE_DIRECTIVE,
    )
}

/// Short stable id for a composed prompt, used to correlate log events.
pub fn prompt_fingerprint(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..6])
}
