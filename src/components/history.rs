use std::collections::VecDeque;

use crate::canvas::PixelBuffer;

// ============================================================================
// LAYER SNAPSHOT
// ============================================================================

/// A copy of the drawing layer at one point in time.
///
/// `PixelBuffer` chunks are `Arc`-shared, so capturing only bumps reference
/// counts; unchanged chunks are shared between neighbouring snapshots.
#[derive(Clone)]
pub struct LayerSnapshot {
    pixels: PixelBuffer,
}

impl LayerSnapshot {
    pub fn capture(layer: &PixelBuffer) -> Self {
        Self { pixels: layer.clone() }
    }

    /// Replace `layer` with this snapshot.  A snapshot taken at a different
    /// surface size is scaled to fill the current layer.
    pub fn restore_into(&self, layer: &mut PixelBuffer) {
        let (w, h) = (layer.width(), layer.height());
        *layer = if self.pixels.width() == w && self.pixels.height() == h {
            self.pixels.clone()
        } else {
            self.pixels.resized(w, h)
        };
    }

    /// Bytes this snapshot keeps alive on its own.
    pub fn memory_size(&self) -> usize {
        self.pixels.memory_bytes()
    }
}

// ============================================================================
// HISTORY STACK
// ============================================================================

/// Linear undo/redo over drawing-layer snapshots.
///
/// The front of the undo stack is the baseline and is never undone past;
/// the back is the state currently shown.
pub struct HistoryStack {
    undo_stack: VecDeque<LayerSnapshot>,
    redo_stack: Vec<LayerSnapshot>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistoryStack {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            // Baseline plus at least one undoable step.
            max_history_size: max_history_size.max(2),
            max_memory_bytes: Some(256 * 1024 * 1024), // 256 MB default limit
        }
    }

    /// Drop all history and record `layer` as the new baseline.
    pub fn seed(&mut self, layer: &PixelBuffer) {
        self.clear();
        self.undo_stack.push_back(LayerSnapshot::capture(layer));
    }

    /// Record the state after a completed action.  Clears the redo branch.
    pub fn snapshot(&mut self, layer: &PixelBuffer) {
        self.redo_stack.clear();
        self.undo_stack.push_back(LayerSnapshot::capture(layer));
        self.prune();
    }

    /// Step back one action.  No-op (returns `false`) at the baseline.
    pub fn undo(&mut self, layer: &mut PixelBuffer) -> bool {
        if self.undo_stack.len() < 2 {
            return false;
        }
        let Some(top) = self.undo_stack.pop_back() else { return false };
        self.redo_stack.push(top);
        if let Some(current) = self.undo_stack.back() {
            current.restore_into(layer);
        }
        true
    }

    /// Re-apply the most recently undone action.  No-op when the redo branch is empty.
    pub fn redo(&mut self, layer: &mut PixelBuffer) -> bool {
        let Some(entry) = self.redo_stack.pop() else { return false };
        entry.restore_into(layer);
        self.undo_stack.push_back(entry);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Entries on the undo stack, baseline included.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Bytes held by all snapshots (chunks shared with the live layer excluded).
    pub fn memory_usage(&self) -> usize {
        self.undo_stack.iter().chain(self.redo_stack.iter()).map(LayerSnapshot::memory_size).sum()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Drop the oldest entries; the next one becomes the baseline.
    fn prune(&mut self) {
        let mut dropped = 0usize;
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
            dropped += 1;
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.undo_stack.len() > 2 && self.memory_usage() > max_bytes {
                self.undo_stack.pop_front();
                dropped += 1;
            }
        }

        if dropped > 0 {
            crate::log_info!(
                "History: pruned {} oldest snapshot(s), {} remain",
                dropped,
                self.undo_stack.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn dot(layer: &mut PixelBuffer, x: u32) {
        layer.put_pixel(x, 0, Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn undo_at_baseline_is_a_no_op() {
        let mut layer = PixelBuffer::new(4, 1);
        let mut history = HistoryStack::default();
        history.seed(&layer);
        assert!(!history.undo(&mut layer));
        assert!(!history.redo(&mut layer));
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn undo_restores_the_previous_state_and_redo_reapplies() {
        let mut layer = PixelBuffer::new(4, 1);
        let mut history = HistoryStack::default();
        history.seed(&layer);

        dot(&mut layer, 0);
        history.snapshot(&layer);
        dot(&mut layer, 1);
        history.snapshot(&layer);
        let latest = layer.to_rgba_image();

        assert!(history.undo(&mut layer));
        assert_eq!(layer.alpha_at(0, 0), 255);
        assert_eq!(layer.alpha_at(1, 0), 0);

        assert!(history.redo(&mut layer));
        assert_eq!(layer.to_rgba_image(), latest);
        assert!(!history.can_redo());
    }

    #[test]
    fn new_snapshot_truncates_the_redo_branch() {
        let mut layer = PixelBuffer::new(4, 1);
        let mut history = HistoryStack::default();
        history.seed(&layer);
        dot(&mut layer, 0);
        history.snapshot(&layer);
        history.undo(&mut layer);
        assert_eq!(history.redo_count(), 1);

        dot(&mut layer, 2);
        history.snapshot(&layer);
        assert_eq!(history.redo_count(), 0);
        assert!(!history.redo(&mut layer));
    }

    #[test]
    fn pruning_promotes_the_next_entry_to_baseline() {
        let mut layer = PixelBuffer::new(4, 1);
        let mut history = HistoryStack::new(3);
        history.seed(&layer);
        for x in 0..4 {
            dot(&mut layer, x);
            history.snapshot(&layer);
        }
        assert_eq!(history.undo_count(), 3);

        assert!(history.undo(&mut layer));
        assert!(history.undo(&mut layer));
        assert!(!history.undo(&mut layer));
        // Baseline is now the state after the second dot.
        assert_eq!(layer.alpha_at(1, 0), 255);
        assert_eq!(layer.alpha_at(2, 0), 0);
    }

    #[test]
    fn snapshot_of_another_size_is_scaled_on_restore() {
        let mut small = PixelBuffer::new(2, 2);
        for y in 0..2 {
            for x in 0..2 {
                small.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let snap = LayerSnapshot::capture(&small);
        let mut big = PixelBuffer::new(8, 8);
        snap.restore_into(&mut big);
        assert_eq!((big.width(), big.height()), (8, 8));
        assert_eq!(*big.get_pixel(4, 4), Rgba([0, 0, 255, 255]));
    }
}
