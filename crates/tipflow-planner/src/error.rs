//! Planner error types.

use thiserror::Error;
use tipflow_core::config::ConfigError;
use tipflow_core::{InvalidCapacityClass, Mount};
use tipflow_deck::DeckError;

/// Errors that abort a plan. None of them are retried.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error(transparent)]
    InvalidCapacityClass(#[from] InvalidCapacityClass),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no tip rack configured for the {0} pipette")]
    NoTipSource(Mount),

    #[error("no pipette attached")]
    NoPipetteAttached,

    #[error("no mounted pipette can handle {0} µL")]
    NotSuitablePipette(f64),

    #[error("insufficient volume: {available} µL available, {required} µL required")]
    InsufficientVolume { available: f64, required: f64 },

    #[error("cannot split {volume} µL into movements of {min}..={max} µL")]
    DecompositionInfeasible { volume: f64, min: f64, max: f64 },

    #[error("{per_reaction} µL per reaction exceeds the tube capacity of {capacity} µL")]
    VolumeExceedsCapacity { per_reaction: f64, capacity: f64 },
}

pub type PlanResult<T> = Result<T, PlanError>;
