//! Gr8Paint project persistence: compressed layer snapshots, bounded
//! undo/redo history, and the `.gr8` container format.
//!
//! The crate is built around three pieces that the editor and the CLI share:
//!
//! * [`snapshot`]: per-layer zlib compression of RGBA pixel data, tuned for
//!   interactive latency rather than maximum ratio.
//! * [`history`]: dual-stack undo/redo over compressed snapshots with a
//!   bounded capacity and change notifications.
//! * [`io`]: the framed `.gr8` on-disk format (magic, version, length,
//!   payload, CRC-32), plus flattened raster export and image import.

#![warn(clippy::all, rust_2018_idioms)]

pub mod canvas;
pub mod cli;
pub mod error;
pub mod history;
pub mod io;
pub mod project;
pub mod snapshot;

pub use canvas::{Layer, LayerStack};
pub use error::{Gr8Error, Result};
pub use history::{HistoryListener, SnapshotHistory};
pub use io::{load_project, read_project, save_project, write_project};
pub use project::Project;
pub use snapshot::{CompressedLayer, CompressedStack};
