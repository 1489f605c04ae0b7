//! Turns a feed entry into a post: title, body text and a generated image.

pub mod canvas;
pub mod font;

use html_escape::{decode_html_entities, encode_text};
use image::RgbImage;
use tracing::warn;

use crate::config::{PublishTarget, RenderConfig};
use crate::domain::FeedEntry;

pub use canvas::{encode_jpeg, Background, ImageLayout, ImageRenderer};
pub use font::TextFont;

const ELLIPSIS: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid canvas size {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("background palette is empty")]
    EmptyPalette,

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// How the body text is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyFormat {
    /// `<p>summary</p><p><a href='link'>Read more</a></p>`; the title is sent separately
    Html,
    /// `{prefix}{title} - {summary} Read more: {link}`
    Caption { prefix: String },
}

#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub title: String,
    pub body: String,
    pub image: Option<RgbImage>,
}

pub struct Transformer {
    format: BodyFormat,
    summary_max_chars: usize,
    images: ImageRenderer,
}

impl Transformer {
    pub fn new(format: BodyFormat, summary_max_chars: usize, images: ImageRenderer) -> Self {
        Self {
            format,
            summary_max_chars,
            images,
        }
    }

    /// Defaults for a publish target, adjusted by the `[render]` section.
    pub fn for_target(target: PublishTarget, config: &RenderConfig) -> Self {
        let (format, default_max, mut layout) = match target {
            PublishTarget::WordPress => (BodyFormat::Html, 500, ImageLayout::blog()),
            PublishTarget::Instagram => (
                BodyFormat::Caption {
                    prefix: config.caption_prefix.clone(),
                },
                200,
                ImageLayout::square(),
            ),
        };
        if let Some(decorations) = config.decorations {
            layout.decorations = decorations;
        }

        let font = TextFont::load(&config.font_paths);
        Self::new(
            format,
            config.summary_max_chars.unwrap_or(default_max),
            ImageRenderer::new(layout, font),
        )
    }

    /// Build the post for `entry`, linking to `cta_link` (possibly shortened).
    ///
    /// Image failures are logged and leave `image` empty.
    pub fn render(&self, entry: &FeedEntry, cta_link: &str) -> RenderedContent {
        let summary = plain_text(&entry.summary);
        let short_summary = truncate_chars(&summary, self.summary_max_chars);

        let body = match &self.format {
            BodyFormat::Html => format!(
                "<p>{}</p><p><a href='{}'>Read more</a></p>",
                encode_text(&short_summary),
                html_escape::encode_single_quoted_attribute(cta_link)
            ),
            BodyFormat::Caption { prefix } => format!(
                "{}{} - {} Read more: {}",
                prefix, entry.title, short_summary, cta_link
            ),
        };

        let image = match self.images.render(&entry.title, &summary) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("Image generation failed for {}: {}", entry.link, e);
                None
            }
        };

        RenderedContent {
            title: entry.title.clone(),
            body,
            image,
        }
    }
}

/// Strip tags, decode entities and collapse whitespace.
pub fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    decode_html_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cap `text` at `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", text[..cut].trim_end(), ELLIPSIS),
    }
}
