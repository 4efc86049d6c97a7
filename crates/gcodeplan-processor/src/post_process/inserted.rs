//! Lines queued for injection by the second pass

use super::offsets::OffsetMap;
use super::usage::FilamentUsageBlock;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertedKind {
    PreCooling,
    PreHeating,
    /// `M73 E<n>` remaining filament changes
    FilamentChangesRemaining,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertedLine {
    pub kind: InsertedKind,
    /// Newline-terminated text
    pub text: String,
}

/// Lines to write after a given line of the file, keyed by its line id
#[derive(Debug, Clone, Default)]
pub struct InsertedLines {
    lines: BTreeMap<u32, Vec<InsertedLine>>,
}

impl InsertedLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line_id: u32, kind: InsertedKind, text: String) {
        self.lines
            .entry(line_id)
            .or_default()
            .push(InsertedLine { kind, text });
    }

    /// Lines to write after line `line_id`
    pub fn after(&self, line_id: u32) -> &[InsertedLine] {
        self.lines
            .get(&line_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &InsertedLine)> {
        self.lines
            .iter()
            .flat_map(|(id, lines)| lines.iter().map(move |line| (*id, line)))
    }

    pub fn offsets(&self) -> OffsetMap {
        let pairs: Vec<(u32, u32)> = self
            .lines
            .iter()
            .map(|(id, lines)| (*id, lines.len() as u32))
            .collect();
        OffsetMap::new(&pairs)
    }

    /// Queue `M73 E<remaining>` at the start of every new filament block
    pub fn schedule_remaining_filament_changes(&mut self, blocks: &[FilamentUsageBlock]) {
        let total = count_changes(blocks);
        let mut done = 0;
        let mut current = None;
        for block in blocks {
            if current.is_some() && current != block.filament_id {
                done += 1;
                self.push(
                    block.lower,
                    InsertedKind::FilamentChangesRemaining,
                    format!("M73 E{}\n", total - done),
                );
            }
            current = block.filament_id;
        }
    }
}

fn count_changes(blocks: &[FilamentUsageBlock]) -> u32 {
    let mut count = 0;
    let mut current = None;
    for block in blocks {
        if current.is_some() && current != block.filament_id {
            count += 1;
        }
        current = block.filament_id;
    }
    count
}
