use super::{default_sections, SectionNode};

/// Linear undo/redo stack of whole section snapshots.
///
/// The cursor always points at a stored snapshot. Pushing drops every
/// snapshot after the cursor before appending, so a new edit after an undo
/// makes the old redo tail unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHistory {
    snapshots: Vec<Vec<SectionNode>>,
    index: usize,
}

impl SectionHistory {
    pub fn new(initial: Vec<SectionNode>) -> Self {
        Self {
            snapshots: vec![initial],
            index: 0,
        }
    }

    pub fn push(&mut self, snapshot: Vec<SectionNode>) {
        self.snapshots.truncate(self.index + 1);
        self.snapshots.push(snapshot);
        self.index = self.snapshots.len() - 1;
    }

    pub fn undo(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.index + 1 >= self.snapshots.len() {
            return false;
        }
        self.index += 1;
        true
    }

    pub fn current(&self) -> &[SectionNode] {
        &self.snapshots[self.index]
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

impl Default for SectionHistory {
    fn default() -> Self {
        Self::new(default_sections())
    }
}
