//! Reading and writing `.gr8` project files, plus flattened raster export
//! and single-image import for the headless CLI.
//!
//! On-disk container layout, all integers little-endian:
//!
//! ```text
//! offset 0    4 bytes  magic "GR8A"
//! offset 4    4 bytes  version (u32, currently 1)
//! offset 8    4 bytes  payload length N (u32)
//! offset 12   N bytes  bincode-encoded CompressedStack
//! offset 12+N 8 bytes  CRC-32 of the payload, widened to u64
//! ```
//!
//! The checksum is verified before the payload is interpreted, so a torn or
//! bit-rotted file fails with a clear integrity error instead of a confusing
//! decode failure deeper in.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::Crc;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder};

use crate::canvas::{Layer, LayerStack, BACKGROUND_LAYER_NAME, MAX_LAYERS, MAX_LAYER_DIM};
use crate::error::{Gr8Error, Result};
use crate::snapshot::CompressedStack;

// ============================================================================
// GR8 PROJECT FILE FORMAT
// ============================================================================

/// Magic bytes opening every `.gr8` file.
pub const GR8_MAGIC: [u8; 4] = *b"GR8A";
/// Current container version. Version 0 never shipped and is rejected.
pub const GR8_VERSION: u32 = 1;
/// Bytes before the payload: magic, version, payload length.
pub const HEADER_LEN: usize = 12;
/// Bytes after the payload: the widened checksum.
pub const TRAILER_LEN: usize = 8;
/// Upper bound on the serialized payload size.
pub const MAX_PAYLOAD_LEN: usize = i32::MAX as usize;

/// Save a layer stack as a `.gr8` project file.
///
/// The stack is validated before the destination is created, so a stack
/// that cannot load back never touches an existing file.
pub fn save_project(path: &Path, stack: &LayerStack) -> Result<()> {
    stack.validate()?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_project(&mut writer, stack)?;
    writer.flush()?;
    log::info!(
        "saved project to {} ({} layers)",
        path.display(),
        stack.len()
    );
    Ok(())
}

/// Serialize and frame a layer stack into any writer.
///
/// The stack is validated before a single byte is written, so an invalid
/// stack never produces a partial file.
pub fn write_project<W: Write>(writer: &mut W, stack: &LayerStack) -> Result<()> {
    stack.validate()?;
    let packed = CompressedStack::capture(stack)?;
    let payload = bincode::serialize(&packed)?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Gr8Error::InvalidSnapshot {
            reason: format!(
                "serialized project of {} bytes exceeds the format limit",
                payload.len()
            ),
        });
    }

    let mut crc = Crc::new();
    crc.update(&payload);
    let checksum = u64::from(crc.sum());

    writer.write_all(&GR8_MAGIC)?;
    writer.write_all(&GR8_VERSION.to_le_bytes())?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&checksum.to_le_bytes())?;
    Ok(())
}

/// Load a `.gr8` project file back into a layer stack.
pub fn load_project(path: &Path) -> Result<LayerStack> {
    let raw = std::fs::read(path)?;
    let stack = read_project(&raw)?;
    log::info!(
        "loaded project from {} ({} layers)",
        path.display(),
        stack.len()
    );
    Ok(stack)
}

/// Decode a framed project from bytes already in memory.
pub fn read_project(raw: &[u8]) -> Result<LayerStack> {
    parse_container(raw)?.stack.restore()
}

/// Parsed container: frame fields plus the still-compressed payload.
struct Container {
    version: u32,
    payload_len: usize,
    checksum: u64,
    stack: CompressedStack,
}

/// Check the frame, verify the checksum, deserialize the payload, and guard
/// its structure. Pixel data stays compressed.
fn parse_container(raw: &[u8]) -> Result<Container> {
    if raw.len() < HEADER_LEN + TRAILER_LEN {
        return Err(Gr8Error::UnsupportedFormat {
            reason: format!(
                "file of {} bytes is too short to be a Gr8Paint project",
                raw.len()
            ),
        });
    }
    if raw[..4] != GR8_MAGIC {
        return Err(Gr8Error::UnsupportedFormat {
            reason: "not a Gr8Paint project file".into(),
        });
    }

    let version = u32_at(raw, 4);
    if version > GR8_VERSION {
        return Err(Gr8Error::UnsupportedFormat {
            reason: format!(
                "project was written by a newer version of Gr8Paint \
                 (file version {version}, supported up to {GR8_VERSION})"
            ),
        });
    }
    if version == 0 {
        return Err(Gr8Error::UnsupportedFormat {
            reason: "unrecognized project version 0".into(),
        });
    }

    let payload_len = u32_at(raw, 8) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Gr8Error::UnsupportedFormat {
            reason: format!("declared payload of {payload_len} bytes exceeds the format limit"),
        });
    }
    if raw.len() != HEADER_LEN + payload_len + TRAILER_LEN {
        return Err(Gr8Error::UnsupportedFormat {
            reason: format!(
                "file length {} does not match declared payload of {payload_len} bytes",
                raw.len()
            ),
        });
    }

    let payload = &raw[HEADER_LEN..HEADER_LEN + payload_len];
    let stored = u64_at(raw, HEADER_LEN + payload_len);
    let mut crc = Crc::new();
    crc.update(payload);
    let computed = u64::from(crc.sum());
    if stored != computed {
        return Err(Gr8Error::FileIntegrity { stored, computed });
    }

    let stack: CompressedStack = bincode::deserialize(payload)?;

    if stack.layers.is_empty() {
        return Err(Gr8Error::InvalidSnapshot {
            reason: "project contains no layers".into(),
        });
    }
    if stack.layers.len() > MAX_LAYERS {
        return Err(Gr8Error::InvalidSnapshot {
            reason: format!(
                "project contains {} layers, exceeding the maximum of {}",
                stack.layers.len(),
                MAX_LAYERS
            ),
        });
    }
    if stack.active_layer_index as usize >= stack.layers.len() {
        return Err(Gr8Error::InvalidSnapshot {
            reason: format!(
                "active layer index {} out of range for {} layer(s)",
                stack.active_layer_index,
                stack.layers.len()
            ),
        });
    }
    for layer in &stack.layers {
        if layer.width == 0
            || layer.height == 0
            || layer.width > MAX_LAYER_DIM
            || layer.height > MAX_LAYER_DIM
        {
            return Err(Gr8Error::InvalidSnapshot {
                reason: format!(
                    "layer '{}' dimensions {}x{} outside supported range",
                    layer.name, layer.width, layer.height
                ),
            });
        }
    }

    Ok(Container {
        version,
        payload_len,
        checksum: stored,
        stack,
    })
}

/// Read a little-endian u32. Caller guarantees `offset + 4 <= raw.len()`.
fn u32_at(raw: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Read a little-endian u64. Caller guarantees `offset + 8 <= raw.len()`.
fn u64_at(raw: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

// ============================================================================
// PROJECT SUMMARY (CLI --info)
// ============================================================================

/// Header and layer metadata of a project file, gathered without
/// decompressing any pixel data.
#[derive(Debug)]
pub struct ProjectSummary {
    pub version: u32,
    pub payload_len: usize,
    pub checksum: u64,
    pub active_layer_index: usize,
    pub layers: Vec<LayerSummary>,
}

#[derive(Debug)]
pub struct LayerSummary {
    pub name: String,
    pub visible: bool,
    pub width: u32,
    pub height: u32,
    pub compressed_len: usize,
}

impl ProjectSummary {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Summarize a project file's contents. Verifies the frame and checksum but
/// leaves pixels compressed, so it is cheap even for large projects.
pub fn summarize_project(raw: &[u8]) -> Result<ProjectSummary> {
    let container = parse_container(raw)?;
    let layers = container
        .stack
        .layers
        .iter()
        .map(|layer| LayerSummary {
            name: layer.name.clone(),
            visible: layer.visible,
            width: layer.width,
            height: layer.height,
            compressed_len: layer.data.len(),
        })
        .collect();
    Ok(ProjectSummary {
        version: container.version,
        payload_len: container.payload_len,
        checksum: container.checksum,
        active_layer_index: container.stack.active_layer_index as usize,
        layers,
    })
}

// ============================================================================
// FLATTENED EXPORT / RASTER IMPORT
// ============================================================================

/// Raster formats the CLI can export a flattened project to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    /// Pick a format from a file extension. `None` for anything else.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Canonical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Flatten a stack and write it as a raster image.
pub fn export_flattened(
    path: &Path,
    stack: &LayerStack,
    format: ExportFormat,
    quality: u8,
) -> Result<()> {
    stack.validate()?;
    let flat = stack.flatten();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                flat.as_raw(),
                flat.width(),
                flat.height(),
                image::ColorType::Rgba8,
            )?;
        }
        ExportFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgba8(flat).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder.encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ColorType::Rgb8,
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Load a raster image as a single-layer stack, the layer named after the
/// file stem.
pub fn import_image(path: &Path) -> Result<LayerStack> {
    let img = image::open(path)?.to_rgba8();
    if img.width() == 0
        || img.height() == 0
        || img.width() > MAX_LAYER_DIM
        || img.height() > MAX_LAYER_DIM
    {
        return Err(Gr8Error::InvalidSnapshot {
            reason: format!(
                "image {}x{} outside the supported layer range",
                img.width(),
                img.height()
            ),
        });
    }
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(BACKGROUND_LAYER_NAME)
        .to_string();
    Ok(LayerStack::new(vec![Layer::from_image(name, img)], 0))
}

// ============================================================================
// TESTS
// ============================================================================
