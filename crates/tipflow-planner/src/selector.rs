//! Pipette selection for a transfer volume.

use tipflow_core::{Mount, Pipette, Pipettes};

use crate::error::{PlanError, PlanResult};

/// Choose which mounted pipette moves `volume` µL.
///
/// A pipette is eligible when `volume` is at least its minimum. With two
/// eligible pipettes the one with the larger minimum wins, as it is the
/// larger instrument and needs fewer movements.
pub fn select(volume: f64, right: Option<&Pipette>, left: Option<&Pipette>) -> PlanResult<Mount> {
    match (right, left) {
        (None, None) => Err(PlanError::NoPipetteAttached),
        (Some(r), Some(l)) => match (r.accepts(volume), l.accepts(volume)) {
            (true, true) if l.min_volume > r.min_volume => Ok(l.mount),
            (true, _) => Ok(r.mount),
            (false, true) => Ok(l.mount),
            (false, false) => Err(PlanError::NotSuitablePipette(volume)),
        },
        (Some(p), None) | (None, Some(p)) => {
            if p.accepts(volume) {
                Ok(p.mount)
            } else {
                Err(PlanError::NotSuitablePipette(volume))
            }
        }
    }
}

pub fn select_from(pipettes: &Pipettes, volume: f64) -> PlanResult<Mount> {
    select(volume, pipettes.right.as_ref(), pipettes.left.as_ref())
}
