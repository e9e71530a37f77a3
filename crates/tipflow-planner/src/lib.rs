//! tipflow-planner: liquid transfer scheduling.
//!
//! Turns transfer requests into the ordered list of device actions a
//! pipetting robot executes, under the physical limits of the deck, the
//! tip inventory, and the pipettes.
//!
//! # Architecture
//!
//! ```text
//! Protocol (whole run)
//!   ├── balancer   (reservoir count, reactions per reservoir)
//!   ├── ResourcePool (deck slots, tip racks)    [tipflow-deck]
//!   └── DispensePlanner (per distribution / transfer)
//!       ├── height     (aspiration depth bucket)
//!       ├── selector   (which pipette)
//!       └── decompose  (feasible movements)
//! ```
//!
//! Execution is strictly sequential. The emitted action list is the literal
//! execution order and is never reordered.

pub mod balancer;
pub mod decompose;
pub mod dispense;
pub mod error;
pub mod height;
pub mod protocol;
pub mod report;
pub mod selector;

pub use balancer::ReactionBatch;
pub use dispense::{DispensePlanner, Distribution, PlannerState, Reservoir, TipSources, TransferRequest, max_run};
pub use error::{PlanError, PlanResult};
pub use protocol::Protocol;
pub use report::{LayoutEntry, ReservoirReport, RunReport, format_report};
