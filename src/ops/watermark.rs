//! Text watermarks.
//!
//! Each selected page gets a Helvetica text overlay with its own
//! transparency state. Font and graphics state objects are shared between
//! pages; the resource names are chosen per page so they never shadow an
//! existing entry.

use super::overlay::{add_page_resource, composite, helvetica, Layer};
use super::{transact, PageSelection};
use crate::content::{helvetica_width, ContentStreamBuilder};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{number, Dict, Object};
use crate::page_tree;
use crate::progress::Monitor;
use serde::{Deserialize, Serialize};

/// Where the watermark text is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkPosition {
    /// Text centred on the crop box
    #[default]
    Center,
    /// Text baseline starts at this point, in page coordinates
    Point {
        /// Horizontal position
        x: f64,
        /// Vertical position
        y: f64,
    },
}

/// Watermark appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Text to draw
    pub text: String,
    /// Font size in points
    pub font_size: f64,
    /// RGB fill colour, components in 0..=1
    pub color: [f64; 3],
    /// Fill opacity, 0 (invisible) to 1 (opaque)
    pub opacity: f64,
    /// Counter-clockwise rotation in degrees
    pub rotation: f64,
    /// Anchor
    pub position: WatermarkPosition,
    /// Above or below the page content
    pub layer: Layer,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 48.0,
            color: [0.5, 0.5, 0.5],
            opacity: 0.3,
            rotation: 45.0,
            position: WatermarkPosition::Center,
            layer: Layer::Foreground,
        }
    }
}

impl WatermarkConfig {
    /// Grey diagonal text at 30% opacity.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the font size.
    pub fn with_font_size(mut self, size: f64) -> Self {
        self.font_size = size;
        self
    }

    /// Set the fill colour.
    pub fn with_color(mut self, r: f64, g: f64, b: f64) -> Self {
        self.color = [r, g, b];
        self
    }

    /// Set the opacity (clamped to 0..=1).
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Set the rotation in degrees.
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = degrees;
        self
    }

    /// Set the anchor.
    pub fn with_position(mut self, position: WatermarkPosition) -> Self {
        self.position = position;
        self
    }

    /// Draw above or below the content.
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.text.is_empty() {
            return Err(Error::Config("watermark text is empty".to_string()));
        }
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(Error::Config(format!("font size {} is not positive", self.font_size)));
        }
        if !self.rotation.is_finite() {
            return Err(Error::Config("watermark rotation is not finite".to_string()));
        }
        Ok(())
    }

    /// Text matrix placing the watermark on a page with this crop box.
    fn text_matrix(&self, crop: [f64; 4]) -> [f64; 6] {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let (tx, ty) = match self.position {
            WatermarkPosition::Point { x, y } => (x, y),
            WatermarkPosition::Center => {
                let cx = (crop[0] + crop[2]) / 2.0;
                let cy = (crop[1] + crop[3]) / 2.0;
                // shift back by half the text width and roughly half the cap height
                let half_w = helvetica_width(&self.text, self.font_size) / 2.0;
                let half_h = self.font_size * 0.35;
                (cx - cos * half_w + sin * half_h, cy - sin * half_w - cos * half_h)
            },
        };
        [cos, sin, -sin, cos, tx, ty]
    }
}

/// Add a watermark to every selected page.
pub fn watermark(
    doc: &mut Document,
    config: &WatermarkConfig,
    selection: &PageSelection,
    monitor: &Monitor,
) -> Result<()> {
    config.validate()?;
    let monitor = monitor.for_operation("watermark");
    transact(doc, |doc| {
        let refs = page_tree::page_refs(doc)?;
        let indices = selection.indices(refs.len())?;

        let font = doc.add_object(helvetica());
        let mut gs = Dict::new();
        gs.insert("Type".to_string(), Object::name("ExtGState"));
        gs.insert("ca".to_string(), number(config.opacity));
        gs.insert("CA".to_string(), number(config.opacity));
        let gs = doc.add_object(Object::Dictionary(gs));

        let total = indices.len();
        for (step, &index) in indices.iter().enumerate() {
            let page = refs[index];
            monitor
                .step(step, total, || {
                    let crop = page_tree::crop_box(doc, page)?;
                    let font_name = add_page_resource(doc, page, "Font", "WmF1", Object::Reference(font))?;
                    let gs_name =
                        add_page_resource(doc, page, "ExtGState", "WmGS1", Object::Reference(gs))?;

                    let [r, g, b] = config.color;
                    let mut content = ContentStreamBuilder::new();
                    content
                        .save_state()
                        .set_ext_gstate(&gs_name)
                        .set_fill_rgb(r, g, b)
                        .begin_text()
                        .set_font(&font_name, config.font_size)
                        .set_text_matrix(config.text_matrix(crop))
                        .show_text(&config.text)
                        .end_text()
                        .restore_state();
                    composite(doc, page, content.build()?, config.layer)
                })
                .map_err(|e| match e {
                    Error::Cancelled { .. } => e,
                    other => other.on_page(index),
                })?;
        }
        log::debug!("Watermarked {} pages", total);
        Ok(())
    })
}
