//! Mounted pipettes and their tip state.

use serde::{Deserialize, Serialize};

use crate::types::{Mount, VOLUME_EPSILON};

/// Index of a tip rack owned by the resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RackId(pub usize);

/// A pipette mounted on the gantry.
///
/// `tip_racks` are non-owning handles into the resource pool's rack arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipette {
    pub mount: Mount,
    pub min_volume: f64,
    pub max_volume: f64,
    /// Largest volume the attached tip type can hold.
    pub tip_capacity: f64,
    pub has_tip: bool,
    pub tip_racks: Vec<RackId>,
    /// Index of the first usable tip in the first rack.
    pub starting_tip_offset: usize,
}

impl Pipette {
    pub fn new(mount: Mount, min_volume: f64, max_volume: f64) -> Self {
        Self {
            mount,
            min_volume,
            max_volume,
            tip_capacity: max_volume,
            has_tip: false,
            tip_racks: Vec::new(),
            starting_tip_offset: 0,
        }
    }

    pub fn with_tip_capacity(mut self, tip_capacity: f64) -> Self {
        self.tip_capacity = tip_capacity;
        self
    }

    /// Largest single movement this pipette can make with its tip.
    pub fn max_transfer(&self) -> f64 {
        self.max_volume.min(self.tip_capacity)
    }

    /// Whether `volume` is at or above the pipette's minimum.
    pub fn accepts(&self, volume: f64) -> bool {
        volume + VOLUME_EPSILON >= self.min_volume
    }
}

/// Up to two mounted pipettes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipettes {
    pub right: Option<Pipette>,
    pub left: Option<Pipette>,
}

impl Pipettes {
    pub fn new(right: Option<Pipette>, left: Option<Pipette>) -> Self {
        Self { right, left }
    }

    pub fn get(&self, mount: Mount) -> Option<&Pipette> {
        match mount {
            Mount::Right => self.right.as_ref(),
            Mount::Left => self.left.as_ref(),
        }
    }

    pub fn get_mut(&mut self, mount: Mount) -> Option<&mut Pipette> {
        match mount {
            Mount::Right => self.right.as_mut(),
            Mount::Left => self.left.as_mut(),
        }
    }

    /// Mounted pipettes, right first.
    pub fn iter(&self) -> impl Iterator<Item = &Pipette> {
        self.right.iter().chain(self.left.iter())
    }

    /// Insert a pipette at its own mount, replacing whatever was there.
    pub fn mount(&mut self, pipette: Pipette) {
        match pipette.mount {
            Mount::Right => self.right = Some(pipette),
            Mount::Left => self.left = Some(pipette),
        }
    }
}
