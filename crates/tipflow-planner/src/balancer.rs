//! Tube balancer: how many reservoirs a reagent needs, and how to split
//! the reactions across them.

use serde::Serialize;
use tipflow_core::VOLUME_EPSILON;
use tracing::debug;

use crate::error::{PlanError, PlanResult};

/// Balanced assignment of reactions to reservoir tubes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionBatch {
    pub tube_count: usize,
    pub reactions_per_tube: Vec<u32>,
    pub volume_per_tube: Vec<f64>,
}

/// Spread `reaction_count` over the fewest tubes holding at most
/// `max_tube_volume` µL each.
///
/// Reactions are split as evenly as possible; the first
/// `reaction_count % tube_count` tubes take one extra.
pub fn plan(per_reaction_volume: f64, reaction_count: u32, max_tube_volume: f64) -> PlanResult<ReactionBatch> {
    if per_reaction_volume > max_tube_volume + VOLUME_EPSILON {
        return Err(PlanError::VolumeExceedsCapacity {
            per_reaction: per_reaction_volume,
            capacity: max_tube_volume,
        });
    }

    let mut tube_count: u32 = 1;
    loop {
        let reactions = distribute(reaction_count, tube_count);
        let volumes: Vec<f64> = reactions
            .iter()
            .map(|&r| f64::from(r) * per_reaction_volume)
            .collect();

        if volumes.iter().all(|&v| v <= max_tube_volume + VOLUME_EPSILON) {
            debug!(tube_count, reaction_count, per_reaction_volume, "balanced reactions");
            return Ok(ReactionBatch {
                tube_count: tube_count as usize,
                reactions_per_tube: reactions,
                volume_per_tube: volumes,
            });
        }
        tube_count += 1;
    }
}

fn distribute(reaction_count: u32, tube_count: u32) -> Vec<u32> {
    let base = reaction_count / tube_count;
    let extra = reaction_count % tube_count;
    (0..tube_count).map(|i| base + u32::from(i < extra)).collect()
}
