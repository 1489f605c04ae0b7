use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::render::font::TextFont;
use crate::render::RenderError;

pub const JPEG_QUALITY: u8 = 85;

const TITLE_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const SUMMARY_COLOR: Rgb<u8> = Rgb([50, 50, 50]);
const DECORATION_COLOR: Rgb<u8> = Rgb([200, 200, 255]);
const DECORATION_COUNT: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Solid(Rgb<u8>),
    /// One color picked at random per image
    Palette(Vec<Rgb<u8>>),
}

/// Canvas size and text placement.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageLayout {
    pub width: u32,
    pub height: u32,
    pub margin_x: i32,
    pub title_top: i32,
    pub title_size: f32,
    pub title_line_height: i32,
    pub title_wrap: usize,
    /// Space between the last title line and the summary
    pub gap: i32,
    pub summary_size: f32,
    pub summary_line_height: i32,
    pub summary_wrap: usize,
    /// No text line may extend into this band at the bottom
    pub bottom_margin: i32,
    pub background: Background,
    pub decorations: bool,
}

impl ImageLayout {
    /// 1200×630 link-preview card on white.
    pub fn blog() -> Self {
        Self {
            width: 1200,
            height: 630,
            margin_x: 50,
            title_top: 50,
            title_size: 40.0,
            title_line_height: 50,
            title_wrap: 30,
            gap: 20,
            summary_size: 30.0,
            summary_line_height: 38,
            summary_wrap: 40,
            bottom_margin: 50,
            background: Background::Solid(Rgb([255, 255, 255])),
            decorations: false,
        }
    }

    /// 1080×1080 square on a pastel background.
    pub fn square() -> Self {
        Self {
            width: 1080,
            height: 1080,
            margin_x: 50,
            title_top: 100,
            title_size: 50.0,
            title_line_height: 60,
            title_wrap: 25,
            gap: 50,
            summary_size: 30.0,
            summary_line_height: 40,
            summary_wrap: 40,
            bottom_margin: 200,
            background: Background::Palette(vec![
                Rgb([240, 248, 255]),
                Rgb([240, 255, 240]),
                Rgb([255, 250, 240]),
                Rgb([248, 248, 255]),
            ]),
            decorations: true,
        }
    }
}

pub struct ImageRenderer {
    layout: ImageLayout,
    font: TextFont,
}

impl ImageRenderer {
    pub fn new(layout: ImageLayout, font: TextFont) -> Self {
        Self { layout, font }
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn render(&self, title: &str, summary: &str) -> Result<RgbImage, RenderError> {
        self.render_with_rng(title, summary, &mut rand::rng())
    }

    /// Title first, summary below it; lines that would cross into the
    /// bottom margin are dropped.
    pub fn render_with_rng<R: Rng + ?Sized>(
        &self,
        title: &str,
        summary: &str,
        rng: &mut R,
    ) -> Result<RgbImage, RenderError> {
        let layout = &self.layout;
        if layout.width == 0 || layout.height == 0 {
            return Err(RenderError::InvalidCanvas {
                width: layout.width,
                height: layout.height,
            });
        }

        let background = match &layout.background {
            Background::Solid(color) => *color,
            Background::Palette(colors) => *colors.choose(rng).ok_or(RenderError::EmptyPalette)?,
        };
        let mut img = RgbImage::from_pixel(layout.width, layout.height, background);

        let limit = layout.height as i32 - layout.bottom_margin;
        let mut y = layout.title_top;

        for line in textwrap::wrap(title, layout.title_wrap) {
            if y + layout.title_line_height > limit {
                break;
            }
            self.font
                .draw_text(&mut img, layout.margin_x, y, layout.title_size, &line, TITLE_COLOR);
            y += layout.title_line_height;
        }

        y += layout.gap;
        for line in textwrap::wrap(summary, layout.summary_wrap) {
            if y + layout.summary_line_height > limit {
                break;
            }
            self.font.draw_text(
                &mut img,
                layout.margin_x,
                y,
                layout.summary_size,
                &line,
                SUMMARY_COLOR,
            );
            y += layout.summary_line_height;
        }

        if layout.decorations {
            for _ in 0..DECORATION_COUNT {
                let x1 = rng.random_range(0..layout.width) as i32;
                let y1 = rng.random_range(0..layout.height) as i32;
                let x2 = x1 + rng.random_range(10..=50);
                let y2 = y1 + rng.random_range(10..=50);
                draw_segment(&mut img, (x1, y1), (x2, y2), DECORATION_COLOR);
            }
        }

        Ok(img)
    }
}

/// Two-pixel-wide straight stroke, clipped to the canvas.
fn draw_segment(img: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).max(1);

    for i in 0..=steps {
        let x = from.0 + dx * i / steps;
        let y = from.1 + dy * i / steps;
        for (ox, oy) in [(0, 0), (1, 0), (0, 1)] {
            let (px, py) = (x + ox, y + oy);
            if px >= 0 && py >= 0 && (px as u32) < img.width() && (py as u32) < img.height() {
                img.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// JPEG bytes ready for upload.
pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        encoder.encode_image(img)?;
    }
    Ok(buf.into_inner())
}
