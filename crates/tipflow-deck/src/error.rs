//! Deck and tip inventory error types.

use thiserror::Error;
use tipflow_core::{CatalogError, Mount, SlotId};

/// Result type alias for deck operations.
pub type DeckResult<T> = Result<T, DeckError>;

#[derive(Debug, Error, PartialEq)]
pub enum DeckError {
    #[error("deck full: placed {placed} of {requested} {kind}")]
    DeckFull {
        kind: String,
        requested: usize,
        placed: usize,
    },

    #[error(transparent)]
    LabwareNotFound(#[from] CatalogError),

    #[error("no slot {0} on this deck")]
    InvalidSlot(u8),

    #[error("slot {0} is already occupied")]
    SlotOccupied(SlotId),

    #[error("no pipette on the {0} mount")]
    NoPipette(Mount),

    #[error("starting tip {tip} does not exist in {kind}")]
    InvalidStartingTip { tip: String, kind: String },

    #[error("{kind} is not a tip rack")]
    NotATipRack { kind: String },

    #[error("no tip available for the {0} pipette")]
    TipsExhausted(Mount),

    #[error("tip rack replacement for the {mount} pipette was not acknowledged: {reason}")]
    ReplacementNotAcknowledged { mount: Mount, reason: String },
}
