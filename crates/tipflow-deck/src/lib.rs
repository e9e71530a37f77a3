//! tipflow-deck: deck slots and tip inventory.
//!
//! Owns the physical resources a run consumes: the fixed set of deck slots
//! and every tip rack placed on them. Pipettes only hold [`RackId`] handles
//! into the pool's rack arena.
//!
//! # Components
//!
//! - **`deck`**: Slot arena and the placement feasibility primitive
//! - **`tiprack`**: Tip positions with a pickup cursor
//! - **`pool`**: `ResourcePool`: on-demand placement and tip pickup
//! - **`operator`**: Blocking manual-replacement signal
//!
//! [`RackId`]: tipflow_core::RackId

pub mod deck;
pub mod error;
pub mod operator;
pub mod pool;
pub mod tiprack;

pub use deck::{Deck, FootprintRules, Labware, Occupant, PlacementPrimitive, SlotConflict};
pub use error::{DeckError, DeckResult};
pub use operator::{AutoAcknowledge, Operator, ReplacementRequest};
pub use pool::{ResourcePool, TipRequest};
pub use tiprack::TipRack;
