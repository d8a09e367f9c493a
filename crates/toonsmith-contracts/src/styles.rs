use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtStyle {
    Instatoon,
    Anime,
    HandDrawn,
    #[serde(rename = "3d")]
    ThreeD,
    ComicBook,
    Ghibli,
    PixelArt,
    InkWash,
    Storybook,
}

impl ArtStyle {
    pub const ALL: [ArtStyle; 9] = [
        ArtStyle::Instatoon,
        ArtStyle::Anime,
        ArtStyle::HandDrawn,
        ArtStyle::ThreeD,
        ArtStyle::ComicBook,
        ArtStyle::Ghibli,
        ArtStyle::PixelArt,
        ArtStyle::InkWash,
        ArtStyle::Storybook,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ArtStyle::Instatoon => "instatoon",
            ArtStyle::Anime => "anime",
            ArtStyle::HandDrawn => "hand-drawn",
            ArtStyle::ThreeD => "3d",
            ArtStyle::ComicBook => "comic-book",
            ArtStyle::Ghibli => "ghibli",
            ArtStyle::PixelArt => "pixel-art",
            ArtStyle::InkWash => "ink-wash",
            ArtStyle::Storybook => "storybook",
        }
    }

    pub fn english_name(self) -> &'static str {
        match self {
            ArtStyle::Instatoon => "Instatoon",
            ArtStyle::Anime => "Anime",
            ArtStyle::HandDrawn => "Hand-drawn",
            ArtStyle::ThreeD => "3D Render",
            ArtStyle::ComicBook => "Comic Book",
            ArtStyle::Ghibli => "Ghibli",
            ArtStyle::PixelArt => "Pixel Art",
            ArtStyle::InkWash => "Ink Wash",
            ArtStyle::Storybook => "Storybook",
        }
    }

    /// Label sent to the planner, e.g. `순정만화 (Anime)`.
    pub fn label(self) -> &'static str {
        match self {
            ArtStyle::Instatoon => "인스타툰 (Instatoon)",
            ArtStyle::Anime => "순정만화 (Anime)",
            ArtStyle::HandDrawn => "손그림 (Hand-drawn)",
            ArtStyle::ThreeD => "3D 캐릭터 (3D Render)",
            ArtStyle::ComicBook => "미국 코믹스 (Comic Book)",
            ArtStyle::Ghibli => "지브리풍 (Ghibli)",
            ArtStyle::PixelArt => "픽셀 아트 (Pixel Art)",
            ArtStyle::InkWash => "수묵화 (Ink Wash)",
            ArtStyle::Storybook => "동화책 (Storybook)",
        }
    }

    pub fn keywords(self) -> &'static str {
        match self {
            ArtStyle::Instatoon => {
                "flat vector illustration, clean bold lines, cute chibi style, minimalist, bright colors"
            }
            ArtStyle::Anime => {
                "japanese anime style, detailed cel shading, shoujo manga, sparkling eyes, high detail"
            }
            ArtStyle::HandDrawn => {
                "colored pencil style, watercolor texture, soft pastel tones, warm atmosphere, sketchy lines"
            }
            ArtStyle::ThreeD => {
                "3D cute character, clay render style, blender 3d, soft lighting, toy-like"
            }
            ArtStyle::ComicBook => {
                "american comic book style, bold ink outlines, halftone dots, dynamic poses, saturated colors"
            }
            ArtStyle::Ghibli => {
                "studio ghibli inspired, hand-painted backgrounds, gentle lighting, whimsical, lush nature"
            }
            ArtStyle::PixelArt => {
                "16-bit pixel art, limited palette, crisp pixels, retro game aesthetic, dithering"
            }
            ArtStyle::InkWash => {
                "east asian ink wash painting, sumi-e brush strokes, rice paper texture, muted tones, negative space"
            }
            ArtStyle::Storybook => {
                "children's storybook illustration, gouache texture, rounded shapes, cozy palette, soft edges"
            }
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ArtStyle::Instatoon => "Cute social-feed comic with clean lines and bright colors",
            ArtStyle::Anime => "Detailed cel shading with sparkling shoujo-manga eyes",
            ArtStyle::HandDrawn => "Warm watercolor and colored-pencil textures",
            ArtStyle::ThreeD => "Toy-like clay render with soft lighting",
            ArtStyle::ComicBook => "Bold inks and halftone shading",
            ArtStyle::Ghibli => "Painterly, gentle, nature-filled scenes",
            ArtStyle::PixelArt => "Retro 16-bit sprites and tiles",
            ArtStyle::InkWash => "Brush-and-ink painting on rice paper",
            ArtStyle::Storybook => "Soft gouache picture-book look",
        }
    }
}

impl fmt::Display for ArtStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ArtStyle {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        let compact: String = normalized
            .chars()
            .filter(|ch| ch.is_alphanumeric())
            .collect();
        ArtStyle::ALL
            .into_iter()
            .find(|style| {
                let slug: String = style.slug().chars().filter(|ch| ch.is_alphanumeric()).collect();
                let english: String = style
                    .english_name()
                    .to_lowercase()
                    .chars()
                    .filter(|ch| ch.is_alphanumeric())
                    .collect();
                compact == slug || compact == english || normalized == style.label().to_lowercase()
            })
            .or(match compact.as_str() {
                "handdrawn" | "pencil" | "watercolor" => Some(ArtStyle::HandDrawn),
                "threed" | "3drender" | "clay" => Some(ArtStyle::ThreeD),
                "comic" | "comics" => Some(ArtStyle::ComicBook),
                "pixel" => Some(ArtStyle::PixelArt),
                "ink" | "sumie" => Some(ArtStyle::InkWash),
                _ => None,
            })
            .ok_or_else(|| format!("Unknown art style '{}'.", raw.trim()))
    }
}
