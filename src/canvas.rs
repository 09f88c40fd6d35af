//! Layer-stack data model shared by the editor, the undo history, and the
//! project file codec.
//!
//! Pixels are plain RGBA8 with straight alpha, 4 bytes per pixel in a
//! fixed channel order, which is what the snapshot codec and the `.gr8`
//! container round-trip byte for byte.

use std::fmt;

use image::{Rgba, RgbaImage};

use crate::error::{Gr8Error, Result};

/// Default name given to the bottom layer of a fresh document.
pub const BACKGROUND_LAYER_NAME: &str = "Background";

/// Largest accepted width or height for a single layer.
pub const MAX_LAYER_DIM: u32 = 32_768;

/// Largest accepted layer count for a single stack.
pub const MAX_LAYERS: usize = 256;

// ============================================================================
// LAYER
// ============================================================================

/// One raster surface: an RGBA8 pixel buffer plus a display name and a
/// visibility flag. Dimensions are fixed at creation and live on the buffer.
#[derive(Clone)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub pixels: RgbaImage,
}

impl Layer {
    /// Create a fully transparent layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            visible: true,
            pixels: RgbaImage::new(width, height),
        }
    }

    /// Create a layer filled with a single color.
    pub fn filled(name: impl Into<String>, width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            pixels: RgbaImage::from_pixel(width, height, color),
        }
    }

    /// Wrap an existing image as a layer.
    pub fn from_image(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            visible: true,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Raw pixel bytes, row-major, 4 bytes per pixel.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.visible == other.visible
            && self.pixels.dimensions() == other.pixels.dimensions()
            && self.pixels.as_raw() == other.pixels.as_raw()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("visible", &self.visible)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered stack of layers (bottom to top) plus the index of the layer
/// currently being edited. This is the unit of undo/redo and of
/// persistence.
///
/// Invariant: `active_layer_index < layers.len()`, except transiently while
/// the whole stack is being swapped out (see [`LayerStack::empty`]).
#[derive(Clone, Debug, PartialEq)]
pub struct LayerStack {
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
}

impl LayerStack {
    pub fn new(layers: Vec<Layer>, active_layer_index: usize) -> Self {
        Self {
            layers,
            active_layer_index,
        }
    }

    /// A fresh document: one transparent background layer, active.
    pub fn with_background(width: u32, height: u32) -> Self {
        Self {
            layers: vec![Layer::new(BACKGROUND_LAYER_NAME, width, height)],
            active_layer_index: 0,
        }
    }

    /// Placeholder used only while a stack is being replaced wholesale.
    /// Does not satisfy [`LayerStack::validate`].
    pub fn empty() -> Self {
        Self {
            layers: Vec::new(),
            active_layer_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer_index)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.get_mut(self.active_layer_index)
    }

    /// Check the stack invariants: a non-empty stack with the active index
    /// in range, and every layer's dimensions within the supported bounds
    /// (at most [`MAX_LAYERS`] layers, each side up to [`MAX_LAYER_DIM`]).
    /// The same limits are enforced when a project file is read back, so a
    /// stack that passes here saves to a loadable file.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Gr8Error::InvalidSnapshot {
                reason: "layer stack contains no layers".into(),
            });
        }
        if self.layers.len() > MAX_LAYERS {
            return Err(Gr8Error::InvalidSnapshot {
                reason: format!(
                    "stack contains {} layers, exceeding the maximum of {}",
                    self.layers.len(),
                    MAX_LAYERS
                ),
            });
        }
        if self.active_layer_index >= self.layers.len() {
            return Err(Gr8Error::InvalidSnapshot {
                reason: format!(
                    "active layer index {} out of range for {} layer(s)",
                    self.active_layer_index,
                    self.layers.len()
                ),
            });
        }
        for layer in &self.layers {
            if layer.width() == 0
                || layer.height() == 0
                || layer.width() > MAX_LAYER_DIM
                || layer.height() > MAX_LAYER_DIM
            {
                return Err(Gr8Error::InvalidSnapshot {
                    reason: format!(
                        "layer '{}' dimensions {}x{} outside supported range",
                        layer.name,
                        layer.width(),
                        layer.height()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Bounding dimensions of the stack: the maximum layer width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        let w = self.layers.iter().map(Layer::width).max().unwrap_or(0);
        let h = self.layers.iter().map(Layer::height).max().unwrap_or(0);
        (w, h)
    }

    /// Composite all visible layers bottom-to-top onto a transparent canvas
    /// with straight-alpha source-over blending. Layers are anchored at the
    /// top-left corner.
    pub fn flatten(&self) -> RgbaImage {
        let (width, height) = self.dimensions();
        let mut out = RgbaImage::new(width, height);
        for layer in self.layers.iter().filter(|l| l.visible) {
            for (x, y, src) in layer.pixels.enumerate_pixels() {
                if src[3] == 0 {
                    continue;
                }
                let dst = out.get_pixel_mut(x, y);
                *dst = blend_over(*src, *dst);
            }
        }
        out
    }
}

/// Straight-alpha source-over: `out = src + dst * (1 - src_alpha)`.
fn blend_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as u32;
    if sa == 255 {
        return src;
    }
    let da = dst[3] as u32;
    let out_a = sa + da * (255 - sa) / 255;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    // Un-premultiplied channels blend as a weighted average. Numerator and
    // denominator carry the same x255 scale, so the quotient never exceeds
    // the larger input channel.
    let src_weight = sa * 255;
    let dst_weight = da * (255 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let sc = src[c] as u32;
        let dc = dst[c] as u32;
        out[c] = ((sc * src_weight + dc * dst_weight) / (src_weight + dst_weight)) as u8;
    }
    out[3] = out_a as u8;
    Rgba(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_layer_is_transparent_and_visible() {
        let layer = Layer::new("Sketch", 8, 6);
        assert_eq!(layer.width(), 8);
        assert_eq!(layer.height(), 6);
        assert!(layer.visible);
        assert!(layer.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn validate_accepts_well_formed_stack() {
        let stack = LayerStack::with_background(4, 4);
        assert!(stack.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_stack() {
        let stack = LayerStack::empty();
        assert!(matches!(
            stack.validate(),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_active_index() {
        let stack = LayerStack::new(vec![Layer::new("Only", 2, 2)], 1);
        assert!(matches!(
            stack.validate(),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_dimensions() {
        let empty = LayerStack::new(vec![Layer::new("Empty", 0, 0)], 0);
        assert!(matches!(
            empty.validate(),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));

        let wide = LayerStack::new(vec![Layer::new("Wide", MAX_LAYER_DIM + 1, 1)], 0);
        assert!(matches!(
            wide.validate(),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn validate_rejects_too_many_layers() {
        let layers: Vec<Layer> = (0..=MAX_LAYERS).map(|_| Layer::new("L", 1, 1)).collect();
        let stack = LayerStack::new(layers, 0);
        assert!(matches!(
            stack.validate(),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn flatten_composites_visible_layers_in_order() {
        let bottom = Layer::filled("Bottom", 2, 2, Rgba([0, 0, 255, 255]));
        let mut top = Layer::new("Top", 2, 2);
        top.pixels.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let stack = LayerStack::new(vec![bottom, top], 1);

        let flat = stack.flatten();
        assert_eq!(*flat.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*flat.get_pixel(1, 1), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn flatten_skips_hidden_layers() {
        let bottom = Layer::filled("Bottom", 2, 2, Rgba([0, 0, 255, 255]));
        let mut top = Layer::filled("Top", 2, 2, Rgba([255, 0, 0, 255]));
        top.visible = false;
        let stack = LayerStack::new(vec![bottom, top], 0);

        let flat = stack.flatten();
        assert_eq!(*flat.get_pixel(1, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn flatten_blends_semi_transparent_pixels_exactly() {
        // Half-strength red over opaque blue.
        let stack = LayerStack::new(
            vec![
                Layer::filled("Bottom", 1, 1, Rgba([0, 0, 255, 255])),
                Layer::filled("Top", 1, 1, Rgba([255, 0, 0, 128])),
            ],
            1,
        );
        assert_eq!(*stack.flatten().get_pixel(0, 0), Rgba([128, 0, 127, 255]));

        // All three channels differ between the layers.
        let stack = LayerStack::new(
            vec![
                Layer::filled("Bottom", 1, 1, Rgba([40, 120, 220, 255])),
                Layer::filled("Top", 1, 1, Rgba([200, 60, 20, 51])),
            ],
            1,
        );
        assert_eq!(*stack.flatten().get_pixel(0, 0), Rgba([72, 108, 180, 255]));
    }

    #[test]
    fn flatten_preserves_full_intensity_over_low_alpha() {
        // Both layers pure red; blending must not dim the channel however
        // thin the backdrop's alpha is.
        let stack = LayerStack::new(
            vec![
                Layer::filled("Wash", 1, 1, Rgba([255, 0, 0, 3])),
                Layer::filled("Glaze", 1, 1, Rgba([255, 0, 0, 100])),
            ],
            1,
        );
        assert_eq!(*stack.flatten().get_pixel(0, 0), Rgba([255, 0, 0, 101]));
    }
}
