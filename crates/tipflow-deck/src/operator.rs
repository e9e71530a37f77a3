//! Operator hand-off for manual tip rack replacement.
//!
//! Replacing a rack in place is the only step that suspends a run. The pool
//! calls [`Operator::await_tip_replacement`] exactly once per exhaustion.
//! `Ok` is the acknowledgment. An error aborts the run; there is no timeout
//! and no retry.

use tipflow_core::{Mount, SlotId};
use tracing::info;

use crate::error::DeckResult;

/// What the operator is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRequest {
    pub mount: Mount,
    pub rack_kind: String,
    pub slots: Vec<SlotId>,
}

impl ReplacementRequest {
    pub fn message(&self) -> String {
        let slots: Vec<String> = self.slots.iter().map(|s| s.to_string()).collect();
        format!(
            "replace {} in slot(s) {} for the {} pipette",
            self.rack_kind,
            slots.join(", "),
            self.mount
        )
    }
}

/// Blocking acknowledgment of a manual replacement.
pub trait Operator {
    /// Returns `Ok` once the racks named in `request` hold fresh tips, or
    /// [`DeckError::ReplacementNotAcknowledged`] when nobody can confirm it.
    ///
    /// [`DeckError::ReplacementNotAcknowledged`]: crate::DeckError::ReplacementNotAcknowledged
    fn await_tip_replacement(&mut self, request: &ReplacementRequest) -> DeckResult<()>;
}

/// Acknowledges immediately and counts the requests. Used for simulation
/// and tests.
#[derive(Debug, Default)]
pub struct AutoAcknowledge {
    pub requests: Vec<ReplacementRequest>,
}

impl Operator for AutoAcknowledge {
    fn await_tip_replacement(&mut self, request: &ReplacementRequest) -> DeckResult<()> {
        info!(mount = %request.mount, kind = %request.rack_kind, "auto-acknowledged tip rack replacement");
        self.requests.push(request.clone());
        Ok(())
    }
}
