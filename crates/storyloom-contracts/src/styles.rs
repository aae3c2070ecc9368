use std::fmt;

use serde::{Deserialize, Serialize};

/// Visual styles offered for illustrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageStyle {
    #[default]
    #[serde(rename = "Digital Art")]
    DigitalArt,
    Anime,
    Watercolor,
    #[serde(rename = "Oil Painting")]
    OilPainting,
    Photorealistic,
    Cinematic,
    #[serde(rename = "Pencil Sketch")]
    PencilSketch,
    #[serde(rename = "Comic Book")]
    ComicBook,
    #[serde(rename = "Dark Fantasy")]
    DarkFantasy,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 9] = [
        ImageStyle::DigitalArt,
        ImageStyle::Anime,
        ImageStyle::Watercolor,
        ImageStyle::OilPainting,
        ImageStyle::Photorealistic,
        ImageStyle::Cinematic,
        ImageStyle::PencilSketch,
        ImageStyle::ComicBook,
        ImageStyle::DarkFantasy,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ImageStyle::DigitalArt => "Digital Art",
            ImageStyle::Anime => "Anime",
            ImageStyle::Watercolor => "Watercolor",
            ImageStyle::OilPainting => "Oil Painting",
            ImageStyle::Photorealistic => "Photorealistic",
            ImageStyle::Cinematic => "Cinematic",
            ImageStyle::PencilSketch => "Pencil Sketch",
            ImageStyle::ComicBook => "Comic Book",
            ImageStyle::DarkFantasy => "Dark Fantasy",
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            ImageStyle::DigitalArt => {
                "high quality digital art, detailed illustration, vibrant colors, sharp focus"
            }
            ImageStyle::Anime => {
                "anime style illustration, cel shading, expressive characters, clean line art"
            }
            ImageStyle::Watercolor => {
                "soft watercolor painting, flowing pigments, textured paper, gentle washes of color"
            }
            ImageStyle::OilPainting => {
                "classical oil painting, rich brush strokes, dramatic chiaroscuro, canvas texture"
            }
            ImageStyle::Photorealistic => {
                "photorealistic, natural lighting, shallow depth of field, 35mm photograph"
            }
            ImageStyle::Cinematic => {
                "cinematic film still, widescreen composition, moody color grading, \
                 volumetric light"
            }
            ImageStyle::PencilSketch => {
                "detailed pencil sketch, graphite shading, cross-hatching, monochrome"
            }
            ImageStyle::ComicBook => {
                "comic book panel, bold ink outlines, halftone shading, dynamic composition"
            }
            ImageStyle::DarkFantasy => {
                "dark fantasy artwork, ominous atmosphere, muted palette, intricate gothic detail"
            }
        }
    }

    /// Lenient lookup by label or identifier. Unknown names fall back to
    /// [`ImageStyle::DigitalArt`].
    pub fn parse(raw: &str) -> ImageStyle {
        Self::lookup(raw).unwrap_or_default()
    }

    pub fn lookup(raw: &str) -> Option<ImageStyle> {
        let wanted = normalize_style_key(raw);
        ImageStyle::ALL
            .into_iter()
            .find(|style| normalize_style_key(style.label()) == wanted)
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize_style_key(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Maturity of the requested illustration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRating {
    #[default]
    General,
    Mature,
}

impl ContentRating {
    pub fn from_adult_flag(is_adult: bool) -> Self {
        if is_adult {
            ContentRating::Mature
        } else {
            ContentRating::General
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            ContentRating::General => {
                "suitable for all audiences, no nudity, no graphic violence"
            }
            ContentRating::Mature => {
                "mature themes allowed, intense and dramatic tone, artistic and tasteful"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_labels_and_identifiers() {
        assert_eq!(ImageStyle::parse("Anime"), ImageStyle::Anime);
        assert_eq!(ImageStyle::parse("oil-painting"), ImageStyle::OilPainting);
        assert_eq!(ImageStyle::parse(" Pencil Sketch "), ImageStyle::PencilSketch);
        assert_eq!(ImageStyle::parse("darkfantasy"), ImageStyle::DarkFantasy);
    }

    #[test]
    fn unknown_style_falls_back_to_digital_art() {
        assert_eq!(ImageStyle::parse("Vaporwave"), ImageStyle::DigitalArt);
        assert_eq!(ImageStyle::parse(""), ImageStyle::DigitalArt);
        assert_eq!(ImageStyle::lookup("Vaporwave"), None);
        assert_eq!(ImageStyle::lookup("comic book"), Some(ImageStyle::ComicBook));
    }

    #[test]
    fn serde_uses_display_labels() -> anyhow::Result<()> {
        let encoded = serde_json::to_string(&ImageStyle::ComicBook)?;
        assert_eq!(encoded, "\"Comic Book\"");
        let decoded: ImageStyle = serde_json::from_str("\"Digital Art\"")?;
        assert_eq!(decoded, ImageStyle::DigitalArt);
        Ok(())
    }

    #[test]
    fn every_style_has_a_distinct_phrase() {
        let mut phrases: Vec<&str> = ImageStyle::ALL.iter().map(|style| style.phrase()).collect();
        phrases.sort_unstable();
        phrases.dedup();
        assert_eq!(phrases.len(), ImageStyle::ALL.len());
    }

    #[test]
    fn adult_flag_maps_to_rating() {
        assert_eq!(ContentRating::from_adult_flag(true), ContentRating::Mature);
        assert_eq!(ContentRating::from_adult_flag(false), ContentRating::General);
        assert_ne!(
            ContentRating::General.phrase(),
            ContentRating::Mature.phrase()
        );
    }
}
