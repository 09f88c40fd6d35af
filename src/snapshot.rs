//! Lossless snapshot codec for layer pixel data.
//!
//! The undo history and the `.gr8` project format both store layers as
//! zlib-compressed RGBA buffers. Compression runs on every recorded edit,
//! so the codec is tuned for speed over ratio; flat fills and transparent
//! regions still shrink by an order of magnitude. Encoder and decoder state
//! is created fresh per call, so snapshots never depend on each other and
//! the functions are safe to run from rayon workers.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{Layer, LayerStack, MAX_LAYER_DIM};
use crate::error::{Gr8Error, Result};

// ============================================================================
// PIXEL CODEC
// ============================================================================

/// Compress a raw RGBA buffer with zlib at the fastest setting.
pub fn deflate_pixels(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

/// Decompress snapshot bytes back into exactly `width * height * 4` raw
/// RGBA bytes.
///
/// Reads at most one byte past the expected length, so an oversized stream
/// is detected without unbounded allocation. Malformed input, a truncated
/// stream, or any output length other than the expected one is
/// [`Gr8Error::CorruptedSnapshot`]; the caller never sees a partially
/// filled buffer.
pub fn inflate_pixels(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = raw_len(width, height)?;
    let mut raw = Vec::with_capacity(expected);
    let mut decoder = ZlibDecoder::new(data).take(expected as u64 + 1);
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| Gr8Error::CorruptedSnapshot {
            reason: format!("zlib inflate failed: {e}"),
        })?;
    if raw.len() != expected {
        return Err(Gr8Error::CorruptedSnapshot {
            reason: format!("decompressed {} bytes, expected {expected}", raw.len()),
        });
    }
    Ok(raw)
}

/// Byte length of a raw RGBA buffer with the given dimensions. Rejects
/// dimensions the editor never produces before any allocation happens.
fn raw_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 || width > MAX_LAYER_DIM || height > MAX_LAYER_DIM {
        return Err(Gr8Error::InvalidSnapshot {
            reason: format!("layer dimensions {width}x{height} outside supported range"),
        });
    }
    let bytes = u64::from(width) * u64::from(height) * 4;
    usize::try_from(bytes).map_err(|_| Gr8Error::InvalidSnapshot {
        reason: format!("layer dimensions {width}x{height} exceed addressable memory"),
    })
}

// ============================================================================
// COMPRESSED LAYER
// ============================================================================

/// At-rest encoding of one [`Layer`]: compressed pixels plus the metadata
/// needed to rebuild it. The compressed stream does not self-describe its
/// dimensions, so width and height ride alongside.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressedLayer {
    pub name: String,
    pub visible: bool,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CompressedLayer {
    pub fn capture(layer: &Layer) -> Result<Self> {
        Ok(Self {
            name: layer.name.clone(),
            visible: layer.visible,
            width: layer.width(),
            height: layer.height(),
            data: deflate_pixels(layer.as_bytes())?,
        })
    }

    pub fn restore(&self) -> Result<Layer> {
        let raw = inflate_pixels(&self.data, self.width, self.height)?;
        let pixels = RgbaImage::from_raw(self.width, self.height, raw).ok_or_else(|| {
            Gr8Error::CorruptedSnapshot {
                reason: format!(
                    "pixel buffer does not fit {}x{} image",
                    self.width, self.height
                ),
            }
        })?;
        let mut layer = Layer::from_image(self.name.clone(), pixels);
        layer.visible = self.visible;
        Ok(layer)
    }

    pub fn compressed_len(&self) -> usize {
        self.data.len()
    }
}

// ============================================================================
// COMPRESSED STACK
// ============================================================================

/// At-rest encoding of a whole [`LayerStack`], produced fresh on every
/// history record or project save and never mutated afterwards. Also the
/// bincode payload of the `.gr8` container.
///
/// The active index is stored as `u32` so the serialized layout does not
/// depend on the host's pointer width.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressedStack {
    pub layers: Vec<CompressedLayer>,
    pub active_layer_index: u32,
}

impl CompressedStack {
    /// Compress every layer of the stack. Layers are independent, so they
    /// are captured in parallel.
    pub fn capture(stack: &LayerStack) -> Result<Self> {
        let active_layer_index =
            u32::try_from(stack.active_layer_index).map_err(|_| Gr8Error::InvalidSnapshot {
                reason: format!(
                    "active layer index {} does not fit the stored format",
                    stack.active_layer_index
                ),
            })?;
        let layers = stack
            .layers
            .par_iter()
            .map(CompressedLayer::capture)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            active_layer_index,
        })
    }

    /// Decompress every layer back into a live stack.
    pub fn restore(&self) -> Result<LayerStack> {
        let layers = self
            .layers
            .par_iter()
            .map(CompressedLayer::restore)
            .collect::<Result<Vec<_>>>()?;
        Ok(LayerStack::new(layers, self.active_layer_index as usize))
    }

    /// Summed compressed byte size across all layers, used for history
    /// memory accounting.
    pub fn compressed_len(&self) -> usize {
        self.layers.iter().map(CompressedLayer::compressed_len).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    fn gradient_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut raw = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                raw.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 7, 255]);
            }
        }
        raw
    }

    #[test]
    fn pixel_round_trip_is_lossless() {
        let raw = gradient_bytes(33, 17);
        let packed = deflate_pixels(&raw).unwrap();
        let restored = inflate_pixels(&packed, 33, 17).unwrap();
        assert_eq!(restored, raw);
    }

    #[test]
    fn flat_fill_compresses_well() {
        let raw = vec![42u8; 64 * 64 * 4];
        let packed = deflate_pixels(&raw).unwrap();
        assert!(
            packed.len() * 10 < raw.len(),
            "flat fill only shrank to {} of {} bytes",
            packed.len(),
            raw.len()
        );
    }

    #[test]
    fn inflate_rejects_garbage() {
        let err = inflate_pixels(b"definitely not zlib", 2, 2).unwrap_err();
        assert!(matches!(err, Gr8Error::CorruptedSnapshot { .. }), "{err}");
    }

    #[test]
    fn inflate_rejects_short_stream() {
        let packed = deflate_pixels(&gradient_bytes(2, 2)).unwrap();
        // Claiming a taller image than was compressed leaves the buffer short.
        let err = inflate_pixels(&packed, 2, 3).unwrap_err();
        assert!(matches!(err, Gr8Error::CorruptedSnapshot { .. }), "{err}");
    }

    #[test]
    fn inflate_rejects_oversized_stream() {
        let packed = deflate_pixels(&gradient_bytes(4, 4)).unwrap();
        let err = inflate_pixels(&packed, 2, 2).unwrap_err();
        assert!(matches!(err, Gr8Error::CorruptedSnapshot { .. }), "{err}");
    }

    #[test]
    fn inflate_rejects_bad_dimensions() {
        assert!(matches!(
            inflate_pixels(&[], 0, 4),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));
        assert!(matches!(
            inflate_pixels(&[], MAX_LAYER_DIM + 1, 4),
            Err(Gr8Error::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn layer_round_trip_preserves_metadata_and_pixels() {
        let mut layer = Layer::filled("Ink", 12, 9, Rgba([200, 10, 30, 128]));
        layer.visible = false;
        let packed = CompressedLayer::capture(&layer).unwrap();
        let restored = packed.restore().unwrap();
        assert_eq!(restored, layer);
    }

    #[test]
    fn stack_round_trip_preserves_order_and_active_index() {
        let stack = LayerStack::new(
            vec![
                Layer::filled("Background", 6, 6, Rgba([255, 255, 255, 255])),
                Layer::new("Sketch", 6, 6),
                Layer::filled("Color", 6, 6, Rgba([0, 128, 0, 200])),
            ],
            2,
        );
        let packed = CompressedStack::capture(&stack).unwrap();
        assert_eq!(packed.layers.len(), 3);
        assert_eq!(packed.active_layer_index, 2);

        let restored = packed.restore().unwrap();
        assert_eq!(restored, stack);
    }

    #[test]
    fn compressed_len_sums_layer_data() {
        let stack = LayerStack::new(
            vec![Layer::new("A", 8, 8), Layer::new("B", 8, 8)],
            0,
        );
        let packed = CompressedStack::capture(&stack).unwrap();
        let by_hand: usize = packed.layers.iter().map(|l| l.data.len()).sum();
        assert_eq!(packed.compressed_len(), by_hand);
        assert!(packed.compressed_len() > 0);
    }

    fn rgba_buffer() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
        (1u32..40, 1u32..40).prop_flat_map(|(w, h)| {
            let len = (w * h * 4) as usize;
            prop::collection::vec(any::<u8>(), len..=len).prop_map(move |raw| (w, h, raw))
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn pixel_codec_round_trips_arbitrary_buffers((width, height, raw) in rgba_buffer()) {
            let packed = deflate_pixels(&raw).unwrap();
            let restored = inflate_pixels(&packed, width, height).unwrap();
            prop_assert_eq!(restored, raw);
        }
    }
}
