pub mod catalog;
pub mod config;
pub mod pipette;
pub mod types;

pub use catalog::{CatalogError, LabwareCatalog, LabwareDefinition, StaticCatalog};
pub use config::RunConfig;
pub use pipette::{Pipette, Pipettes, RackId};
pub use types::*;
