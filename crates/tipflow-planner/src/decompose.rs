//! Movement decomposition: splitting a volume into aspiratable pieces.

use tipflow_core::VOLUME_EPSILON;

use crate::error::{PlanError, PlanResult};

/// Split `total_volume` into movements of at most `max_transfer`, each at
/// least `pipette_min`.
///
/// Full movements of `max_transfer` come first. A remainder below the
/// pipette minimum is rebalanced with the last full movement into
/// `max_transfer / 2 + rest` and `max_transfer / 2`.
pub fn split(total_volume: f64, max_transfer: f64, pipette_min: f64) -> PlanResult<Vec<f64>> {
    let infeasible = || PlanError::DecompositionInfeasible {
        volume: total_volume,
        min: pipette_min,
        max: max_transfer,
    };
    if max_transfer <= 0.0 || total_volume <= 0.0 {
        return Err(infeasible());
    }

    let full = ((total_volume + VOLUME_EPSILON) / max_transfer).floor() as usize;
    let mut rest = total_volume - full as f64 * max_transfer;
    if rest < VOLUME_EPSILON {
        rest = 0.0;
    }

    if full == 0 {
        return if rest + VOLUME_EPSILON >= pipette_min {
            Ok(vec![rest])
        } else {
            Err(infeasible())
        };
    }

    let mut movements = vec![max_transfer; full];
    if rest == 0.0 {
        return Ok(movements);
    }
    if rest + VOLUME_EPSILON >= pipette_min {
        movements.push(rest);
        return Ok(movements);
    }

    let half = max_transfer / 2.0;
    if half + VOLUME_EPSILON < pipette_min {
        return Err(infeasible());
    }
    movements.pop();
    movements.push(half + rest);
    movements.push(half);
    Ok(movements)
}

/// Split `volume` into repeated `pipette_min` movements.
///
/// A remainder below the minimum is folded into the last movement, so every
/// piece is aspiratable and none exceeds `max_transfer`.
pub fn min_increments(volume: f64, pipette_min: f64, max_transfer: f64) -> PlanResult<Vec<f64>> {
    let infeasible = || PlanError::DecompositionInfeasible {
        volume,
        min: pipette_min,
        max: max_transfer,
    };
    if pipette_min <= 0.0 || volume + VOLUME_EPSILON < pipette_min {
        return Err(infeasible());
    }

    let count = ((volume + VOLUME_EPSILON) / pipette_min).floor() as usize;
    let rest = volume - count as f64 * pipette_min;
    let mut movements = vec![pipette_min; count];
    if rest >= VOLUME_EPSILON {
        if let Some(last) = movements.last_mut() {
            *last += rest;
        }
    }
    if movements.iter().any(|&m| m > max_transfer + VOLUME_EPSILON) {
        return Err(infeasible());
    }
    Ok(movements)
}
