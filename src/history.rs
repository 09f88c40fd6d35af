//! Bounded undo/redo history over compressed layer-stack snapshots.
//!
//! The editor records a snapshot of the whole stack before every mutating
//! edit. Entries live in memory in compressed form, so a full history of
//! large canvases stays affordable; the stack depth is bounded and the
//! oldest entries are evicted first.

use std::collections::VecDeque;

use crate::canvas::LayerStack;
use crate::error::Result;
use crate::snapshot::CompressedStack;

/// Undo depth used by [`SnapshotHistory::new`].
pub const DEFAULT_CAPACITY: usize = 16;

// ============================================================================
// LISTENER
// ============================================================================

/// Observer for history availability changes.
///
/// Fired after every structural change with the new undo/redo availability,
/// which is what toolbars and menus need to enable or grey out their
/// controls. Registration is per [`SnapshotHistory`] instance, so two open
/// documents never see each other's notifications.
pub trait HistoryListener: Send {
    fn history_changed(&mut self, can_undo: bool, can_redo: bool);
}

impl<F: FnMut(bool, bool) + Send> HistoryListener for F {
    fn history_changed(&mut self, can_undo: bool, can_redo: bool) {
        self(can_undo, can_redo)
    }
}

// ============================================================================
// SNAPSHOT HISTORY
// ============================================================================

/// Linear undo/redo store with a bounded undo depth.
///
/// Two stacks: `undo` holds past states (most recent at the back), `redo`
/// holds states walked back from. Recording a new edit clears `redo`, so
/// history never branches. The store only ever holds compressed copies;
/// the live stack stays exclusively with the caller.
pub struct SnapshotHistory {
    undo_stack: VecDeque<CompressedStack>,
    redo_stack: Vec<CompressedStack>,
    capacity: usize,
    /// Running compressed-byte total across both stacks.
    total_memory: usize,
    listeners: Vec<Box<dyn HistoryListener>>,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A capacity of zero would make every record a no-op, so it is clamped
    /// to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
            total_memory: 0,
            listeners: Vec::new(),
        }
    }

    /// Register an observer for `(can_undo, can_redo)` changes.
    pub fn subscribe(&mut self, listener: Box<dyn HistoryListener>) {
        self.listeners.push(listener);
    }

    /// Record the current stack as the state to return to on undo. Call
    /// before applying a mutating edit.
    ///
    /// Any redoable future is discarded. On error the history is unchanged.
    pub fn record(&mut self, current: &LayerStack) -> Result<()> {
        let entry = CompressedStack::capture(current)?;
        // A new edit invalidates everything that was undone.
        for dropped in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(dropped.compressed_len());
        }
        self.push_undo(entry);
        self.notify();
        Ok(())
    }

    /// Step back: park the current stack on the redo side and return the
    /// most recently recorded state. `Ok(None)` when there is nothing to
    /// undo; the caller keeps its stack and no notification fires.
    pub fn undo(&mut self, current: &LayerStack) -> Result<Option<LayerStack>> {
        // Restore and capture before touching either stack, so a codec
        // failure leaves the history exactly as it was.
        let previous = match self.undo_stack.back() {
            Some(entry) => entry.restore()?,
            None => return Ok(None),
        };
        let parked = CompressedStack::capture(current)?;

        if let Some(popped) = self.undo_stack.pop_back() {
            self.total_memory = self.total_memory.saturating_sub(popped.compressed_len());
        }
        self.total_memory += parked.compressed_len();
        self.redo_stack.push(parked);
        self.notify();
        Ok(Some(previous))
    }

    /// Step forward again after an undo. Mirror image of [`Self::undo`].
    pub fn redo(&mut self, current: &LayerStack) -> Result<Option<LayerStack>> {
        let next = match self.redo_stack.last() {
            Some(entry) => entry.restore()?,
            None => return Ok(None),
        };
        let parked = CompressedStack::capture(current)?;

        if let Some(popped) = self.redo_stack.pop() {
            self.total_memory = self.total_memory.saturating_sub(popped.compressed_len());
        }
        self.push_undo(parked);
        self.notify();
        Ok(Some(next))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Compressed bytes currently held across both stacks, maintained
    /// incrementally.
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Drop all history, for example after loading a different project.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
        self.notify();
    }

    /// Append onto the undo stack, evicting the oldest entries while over
    /// capacity. Every path that grows the undo stack goes through here.
    fn push_undo(&mut self, entry: CompressedStack) {
        self.total_memory += entry.compressed_len();
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.capacity {
            if let Some(evicted) = self.undo_stack.pop_front() {
                log::debug!(
                    "history at capacity {}, evicting oldest snapshot ({} bytes)",
                    self.capacity,
                    evicted.compressed_len()
                );
                self.total_memory = self.total_memory.saturating_sub(evicted.compressed_len());
            }
        }
    }

    fn notify(&mut self) {
        let can_undo = !self.undo_stack.is_empty();
        let can_redo = !self.redo_stack.is_empty();
        for listener in &mut self.listeners {
            listener.history_changed(can_undo, can_redo);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Layer;
    use image::Rgba;
    use std::sync::{Arc, Mutex};

    /// One-layer stack whose fill color identifies the state.
    fn state(tag: u8) -> LayerStack {
        LayerStack::new(
            vec![Layer::filled(format!("state-{tag}"), 4, 4, Rgba([tag, 0, 0, 255]))],
            0,
        )
    }

    #[test]
    fn undo_returns_previously_recorded_state() {
        let mut history = SnapshotHistory::new();
        let before = state(1);
        history.record(&before).unwrap();

        let after = state(2);
        let restored = history.undo(&after).unwrap().unwrap();
        assert_eq!(restored, before);
        assert!(!history.can_undo());
        assert!(history.can_redo());
    }

    #[test]
    fn undo_on_empty_history_is_a_noop() {
        let mut history = SnapshotHistory::new();
        let current = state(1);
        assert!(history.undo(&current).unwrap().is_none());
        assert!(history.redo(&current).unwrap().is_none());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn redo_after_undo_restores_the_undone_state() {
        let mut history = SnapshotHistory::new();
        let first = state(1);
        history.record(&first).unwrap();
        let second = state(2);

        let back = history.undo(&second).unwrap().unwrap();
        assert_eq!(back, first);

        let forward = history.redo(&back).unwrap().unwrap();
        assert_eq!(forward, second);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn record_clears_the_redo_stack() {
        let mut history = SnapshotHistory::new();
        history.record(&state(1)).unwrap();
        let back = history.undo(&state(2)).unwrap().unwrap();
        assert!(history.can_redo());

        history.record(&back).unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn capacity_bound_evicts_oldest_entries() {
        let mut history = SnapshotHistory::with_capacity(3);
        for tag in 0..5 {
            history.record(&state(tag)).unwrap();
        }
        assert_eq!(history.undo_len(), 3);

        // Walking back yields states 4, 3, 2; 0 and 1 were evicted.
        let mut current = state(5);
        for expected in (2..5).rev() {
            current = history.undo(&current).unwrap().unwrap();
            assert_eq!(current.layers[0].name, format!("state-{expected}"));
        }
        assert!(history.undo(&current).unwrap().is_none());
    }

    #[test]
    fn capacity_zero_is_clamped_to_one() {
        let mut history = SnapshotHistory::with_capacity(0);
        history.record(&state(1)).unwrap();
        history.record(&state(2)).unwrap();
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn default_capacity_matches_constant() {
        let mut history = SnapshotHistory::new();
        for tag in 0..40 {
            history.record(&state(tag)).unwrap();
        }
        assert_eq!(history.undo_len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn listeners_observe_availability_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut history = SnapshotHistory::new();
        history.subscribe(Box::new(move |can_undo: bool, can_redo: bool| {
            sink.lock().unwrap().push((can_undo, can_redo));
        }));

        history.record(&state(1)).unwrap();
        let back = history.undo(&state(2)).unwrap().unwrap();
        history.redo(&back).unwrap().unwrap();
        history.clear();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(true, false), (false, true), (true, false), (false, false)]
        );
    }

    #[test]
    fn noop_undo_fires_no_notification() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut history = SnapshotHistory::new();
        history.subscribe(Box::new(move |can_undo: bool, can_redo: bool| {
            sink.lock().unwrap().push((can_undo, can_redo));
        }));

        history.undo(&state(1)).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn memory_usage_rises_and_falls_with_contents() {
        let mut history = SnapshotHistory::new();
        assert_eq!(history.memory_usage(), 0);

        history.record(&state(1)).unwrap();
        let after_one = history.memory_usage();
        assert!(after_one > 0);

        history.record(&state(2)).unwrap();
        assert!(history.memory_usage() > after_one);

        history.clear();
        assert_eq!(history.memory_usage(), 0);
    }
}
