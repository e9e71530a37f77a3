//! Aspiration height model for reservoir tubes.
//!
//! Each capacity class has a piecewise-constant table mapping remaining
//! volume to an aspiration depth (mm above the tube bottom). Two volumes
//! share a bucket iff no threshold lies strictly between them, which is
//! when the pipette can keep aspirating without being re-leveled.

use tipflow_core::CapacityClass;

use crate::error::PlanResult;

struct DepthTable {
    /// `(volume_threshold, depth)`, ascending.
    bands: &'static [(f64, f64)],
    /// Depth above the last threshold.
    top: f64,
    /// Whether a volume equal to a threshold falls into that band.
    inclusive: bool,
}

impl DepthTable {
    fn depth(&self, volume: f64) -> f64 {
        self.bands
            .iter()
            .find(|(threshold, _)| {
                if self.inclusive {
                    volume <= *threshold
                } else {
                    volume < *threshold
                }
            })
            .map_or(self.top, |&(_, depth)| depth)
    }
}

const TUBE_15ML: DepthTable = DepthTable {
    bands: &[(100.0, 0.7), (3000.0, 1.0), (6000.0, 25.0), (9000.0, 45.0)],
    top: 65.0,
    inclusive: true,
};

const TUBE_50ML: DepthTable = DepthTable {
    bands: &[
        (5000.0, 1.0),
        (12500.0, 12.0),
        (22500.0, 28.0),
        (32500.0, 45.0),
        (42500.0, 62.0),
    ],
    top: 81.0,
    inclusive: false,
};

fn table(class: CapacityClass) -> &'static DepthTable {
    match class {
        CapacityClass::Tube15ml => &TUBE_15ML,
        CapacityClass::Tube50ml => &TUBE_50ML,
    }
}

/// Aspiration depth for a tube of `class` holding `volume` µL.
pub fn bucket(class: CapacityClass, volume: f64) -> f64 {
    table(class).depth(volume)
}

/// [`bucket`] keyed by the raw capacity in µL.
pub fn bucket_for_capacity(capacity_ul: u32, volume: f64) -> PlanResult<f64> {
    let class = CapacityClass::try_from(capacity_ul)?;
    Ok(bucket(class, volume))
}

/// Whether both volumes are served at the same depth.
pub fn same_bucket(class: CapacityClass, a: f64, b: f64) -> bool {
    bucket(class, a) == bucket(class, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use tipflow_core::InvalidCapacityClass;

    #[test]
    fn tube_15ml_boundaries() {
        let c = CapacityClass::Tube15ml;
        assert_eq!(bucket(c, 0.0), 0.7);
        assert_eq!(bucket(c, 100.0), 0.7);
        assert_eq!(bucket(c, 100.01), 1.0);
        assert_eq!(bucket(c, 3000.0), 1.0);
        assert_eq!(bucket(c, 6000.0), 25.0);
        assert_eq!(bucket(c, 9000.0), 45.0);
        assert_eq!(bucket(c, 9000.5), 65.0);
        assert_eq!(bucket(c, 15000.0), 65.0);
    }

    #[test]
    fn tube_50ml_boundaries() {
        let c = CapacityClass::Tube50ml;
        assert_eq!(bucket(c, 4999.99), 1.0);
        assert_eq!(bucket(c, 5000.0), 12.0);
        assert_eq!(bucket(c, 22499.0), 28.0);
        assert_eq!(bucket(c, 32500.0), 62.0);
        assert_eq!(bucket(c, 42500.0), 81.0);
        assert_eq!(bucket(c, 50000.0), 81.0);
    }

    #[test]
    fn unknown_capacity_rejected() {
        assert_eq!(bucket_for_capacity(15000, 50.0), Ok(0.7));
        assert_eq!(
            bucket_for_capacity(1500, 50.0),
            Err(PlanError::InvalidCapacityClass(InvalidCapacityClass(1500)))
        );
    }

    #[test]
    fn same_bucket_only_without_threshold_between() {
        let c = CapacityClass::Tube15ml;
        assert!(same_bucket(c, 14000.0, 9000.5));
        assert!(!same_bucket(c, 9500.0, 9000.0));
        let c = CapacityClass::Tube50ml;
        assert!(!same_bucket(c, 12500.0, 12499.0));
    }
}
