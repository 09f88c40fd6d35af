//! A single open document: live layer stack, undo history, disk location.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::canvas::LayerStack;
use crate::error::{Gr8Error, Result};
use crate::history::SnapshotHistory;
use crate::io;

/// Editing session for one document.
///
/// Owns the live [`LayerStack`] and routes undo/redo through its own
/// [`SnapshotHistory`], so multiple open projects never share state.
pub struct Project {
    pub id: Uuid,
    pub stack: LayerStack,
    pub history: SnapshotHistory,
    /// `None` for unsaved/untitled documents.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name, derived from the path or "Untitled-N".
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            stack: LayerStack::with_background(width, height),
            history: SnapshotHistory::new(),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{untitled_counter}"),
        }
    }

    /// Load an existing `.gr8` file into a fresh session.
    pub fn open(path: PathBuf) -> Result<Self> {
        let stack = io::load_project(&path)?;
        let name = display_name(&path);
        Ok(Self {
            id: Uuid::new_v4(),
            stack,
            history: SnapshotHistory::new(),
            path: Some(path),
            is_dirty: false,
            name,
        })
    }

    /// Record the current stack in history and mark the document dirty.
    /// Call immediately before applying a mutating edit.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.history.record(&self.stack)?;
        self.is_dirty = true;
        Ok(())
    }

    /// Step the document back one recorded state. Returns whether anything
    /// changed.
    pub fn undo(&mut self) -> Result<bool> {
        match self.history.undo(&self.stack)? {
            Some(previous) => {
                self.stack = previous;
                self.is_dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step the document forward again after an undo.
    pub fn redo(&mut self) -> Result<bool> {
        match self.history.redo(&self.stack)? {
            Some(next) => {
                self.stack = next;
                self.is_dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save to the document's current path.
    pub fn save(&mut self) -> Result<()> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => {
                return Err(Gr8Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no file path set for save",
                )));
            }
        };
        io::save_project(&path, &self.stack)?;
        self.is_dirty = false;
        Ok(())
    }

    /// Save to a new path and adopt it as the document's location.
    pub fn save_as(&mut self, path: PathBuf) -> Result<()> {
        io::save_project(&path, &self.stack)?;
        self.path = Some(path);
        self.update_name_from_path();
        self.is_dirty = false;
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = display_name(path);
        }
    }

    /// Display title with the unsaved-changes marker.
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
