use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use guard_proto::{BoundingBox, Detection};

use crate::classify::Classification;

pub const HELMET_COLOR: Rgba<u8> = Rgba([0x00, 0xf2, 0xff, 0xff]);
pub const ALERT_COLOR: Rgba<u8> = Rgba([0xff, 0x2a, 0x6d, 0xff]);

// gap between caption bottom and box top
const CAPTION_GAP: i32 = 4;

// DejaVu Sans, see assets/DejaVuSans.LICENSE
static BUILTIN_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub font_path: Option<String>,
    pub font_size: f32,
    pub stroke_width: u32,
    pub snapshot_path: Option<String>,
    pub snapshot_interval_ms: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: 20.0,
            stroke_width: 3,
            snapshot_path: None,
            snapshot_interval_ms: 1000,
        }
    }
}

/// Color class of a drawn box: cyan for helmet-positive labels, red for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxCategory {
    Helmet,
    Other,
}

impl BoxCategory {
    pub fn color(self) -> Rgba<u8> {
        match self {
            BoxCategory::Helmet => HELMET_COLOR,
            BoxCategory::Other => ALERT_COLOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawnBox {
    pub rect: Rect,
    pub category: BoxCategory,
    pub caption: String,
    pub caption_at: (i32, i32),
}

#[derive(Debug, Clone, Default)]
pub struct RenderReport {
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<DrawnBox>,
}

impl RenderReport {
    pub fn count(&self, category: BoxCategory) -> usize {
        self.boxes.iter().filter(|b| b.category == category).count()
    }
}

/// Draws the latest frame plus its valid detections. Every call repaints from scratch.
pub struct Overlay {
    cfg: OverlayConfig,
    font: FontArc,
    surface: RgbaImage,
}

impl Overlay {
    pub fn new(cfg: OverlayConfig) -> Result<Self> {
        let font = match &cfg.font_path {
            Some(path) => load_font(path).or_else(|e| {
                warn!("overlay: {:#}; using the built-in font", e);
                builtin_font()
            })?,
            None => builtin_font()?,
        };
        Ok(Self { cfg, font, surface: RgbaImage::new(0, 0) })
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.cfg
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn render(&mut self, frame: &DynamicImage, classification: &Classification) -> RenderReport {
        self.reset_surface(frame);
        let (w, h) = self.surface.dimensions();
        let scale = PxScale::from(self.cfg.font_size);
        let mut boxes = Vec::new();

        for a in classification.valid() {
            let category = if a.positive { BoxCategory::Helmet } else { BoxCategory::Other };
            let Some(rect) = clip_box(a.detection.bbox, w, h) else {
                debug!("overlay: box for {:?} lies off-surface", a.detection.label);
                continue;
            };
            let color = category.color();
            for i in 0..self.cfg.stroke_width.max(1) {
                match inset(rect, i) {
                    Some(r) => draw_hollow_rect_mut(&mut self.surface, r, color),
                    None => break,
                }
            }

            let text = caption(&a.detection);
            let (tw, th) = text_size(scale, &self.font, &text);
            let at = caption_origin(rect, tw, th, w, h);
            draw_text_mut(&mut self.surface, color, at.0, at.1, scale, &self.font, &text);
            boxes.push(DrawnBox { rect, category, caption: text, caption_at: at });
        }

        RenderReport { width: w, height: h, boxes }
    }

    /// Writes the surface as PNG through a temp file so readers never see a partial image.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("png.tmp");
        self.surface
            .save_with_format(&tmp, ImageFormat::Png)
            .with_context(|| format!("write snapshot {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("rename snapshot to {}", path.display()))?;
        Ok(())
    }

    fn reset_surface(&mut self, frame: &DynamicImage) {
        let rgba = frame.to_rgba8();
        if self.surface.dimensions() != rgba.dimensions() {
            debug!(
                "overlay: surface {:?} -> {:?}",
                self.surface.dimensions(),
                rgba.dimensions()
            );
        }
        self.surface = rgba;
    }
}

pub fn load_font(path: &str) -> Result<FontArc> {
    let bytes = std::fs::read(path).with_context(|| format!("read font {}", path))?;
    let font = FontArc::try_from_vec(bytes).map_err(|e| anyhow::anyhow!("invalid font {}: {}", path, e))?;
    info!("overlay: loaded font {}", path);
    Ok(font)
}

/// `"<label> <confidence%>"`, confidence rounded to a whole percent.
pub fn caption(d: &Detection) -> String {
    format!("{} {}%", d.label, (d.confidence * 100.0).round() as i32)
}

/// Pixel rectangle of a box after ordering its corners and clipping it to a `w`x`h` surface.
/// Returns `None` when nothing of the box is on the surface.
pub fn clip_box(bbox: BoundingBox, w: u32, h: u32) -> Option<Rect> {
    if w == 0 || h == 0 {
        return None;
    }
    let b = bbox.normalized();
    if ![b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (wf, hf) = (w as f32, h as f32);
    if b.x2 < 0.0 || b.y2 < 0.0 || b.x1 >= wf || b.y1 >= hf {
        return None;
    }
    let x1 = b.x1.max(0.0).round() as i32;
    let y1 = b.y1.max(0.0).round() as i32;
    let x2 = b.x2.min(wf - 1.0).round() as i32;
    let y2 = b.y2.min(hf - 1.0).round() as i32;
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1).max(1) as u32, (y2 - y1 + 1).max(1) as u32))
}

/// Top-left of a caption placed above the box's top-left corner, kept fully on-surface.
pub fn caption_origin(rect: Rect, text_w: u32, text_h: u32, w: u32, h: u32) -> (i32, i32) {
    let max_x = (w as i32 - text_w as i32).max(0);
    let max_y = (h as i32 - text_h as i32).max(0);
    let x = rect.left().clamp(0, max_x);
    let y = (rect.top() - text_h as i32 - CAPTION_GAP).clamp(0, max_y);
    (x, y)
}

fn inset(rect: Rect, i: u32) -> Option<Rect> {
    if i == 0 {
        return Some(rect);
    }
    if rect.width() <= 2 * i || rect.height() <= 2 * i {
        return None;
    }
    Some(Rect::at(rect.left() + i as i32, rect.top() + i as i32).of_size(rect.width() - 2 * i, rect.height() - 2 * i))
}

pub fn builtin_font() -> Result<FontArc> {
    FontArc::try_from_slice(BUILTIN_FONT).map_err(|e| anyhow::anyhow!("invalid built-in font: {}", e))
}
