//! Tip rack: ordered tip positions with a pickup cursor.

use tipflow_core::{RackId, SlotId};

#[derive(Debug, Clone, PartialEq)]
pub struct TipRack {
    pub id: RackId,
    pub slot: SlotId,
    pub kind: String,
    tips: Vec<String>,
    /// Index the cursor returns to on reset.
    start: usize,
    cursor: usize,
}

impl TipRack {
    pub fn new(id: RackId, slot: SlotId, kind: impl Into<String>, tips: Vec<String>) -> Self {
        Self {
            id,
            slot,
            kind: kind.into(),
            tips,
            start: 0,
            cursor: 0,
        }
    }

    /// Take the next tip, advancing the cursor.
    pub fn next_tip(&mut self) -> Option<String> {
        let tip = self.tips.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(tip)
    }

    pub fn peek(&self) -> Option<&str> {
        self.tips.get(self.cursor).map(String::as_str)
    }

    pub fn remaining(&self) -> usize {
        self.tips.len().saturating_sub(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position_of(&self, tip: &str) -> Option<usize> {
        self.tips.iter().position(|t| t == tip)
    }

    /// Set the starting offset and move the cursor there.
    pub fn start_at(&mut self, offset: usize) {
        self.start = offset.min(self.tips.len());
        self.cursor = self.start;
    }

    /// A freshly loaded rack: cursor back to the starting offset.
    pub fn reset(&mut self) {
        self.cursor = self.start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rack() -> TipRack {
        TipRack::new(
            RackId(0),
            SlotId(1),
            "tiny",
            vec!["A1".to_string(), "B1".to_string(), "C1".to_string()],
        )
    }

    #[test]
    fn hands_out_tips_in_order() {
        let mut r = rack();
        assert_eq!(r.next_tip().as_deref(), Some("A1"));
        assert_eq!(r.next_tip().as_deref(), Some("B1"));
        assert_eq!(r.remaining(), 1);
        assert_eq!(r.next_tip().as_deref(), Some("C1"));
        assert!(r.is_exhausted());
        assert_eq!(r.next_tip(), None);
    }

    #[test]
    fn reset_returns_to_start_offset() {
        let mut r = rack();
        r.start_at(1);
        assert_eq!(r.peek(), Some("B1"));
        r.next_tip();
        r.next_tip();
        assert!(r.is_exhausted());
        r.reset();
        assert_eq!(r.next_tip().as_deref(), Some("B1"));
    }
}
