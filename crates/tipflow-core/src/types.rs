//! Shared types used across tipflow crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Volume tolerance in µL used for every volume comparison.
pub const VOLUME_EPSILON: f64 = 0.001;

/// Which side of the gantry a pipette is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Right,
    Left,
}

impl Mount {
    /// The opposite mount.
    pub fn other(self) -> Self {
        match self {
            Mount::Right => Mount::Left,
            Mount::Left => Mount::Right,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mount::Right => "right",
            Mount::Left => "left",
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returned when a reservoir capacity is neither 15000 nor 50000 µL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid capacity class: {0} µL (expected 15000 or 50000)")]
pub struct InvalidCapacityClass(pub u32);

/// Nominal capacity of a reservoir tube.
///
/// Serialized as the plain µL number so configs read `capacity_class = 15000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CapacityClass {
    /// 15 mL conical tube.
    Tube15ml,
    /// 50 mL conical tube.
    Tube50ml,
}

impl CapacityClass {
    pub fn microliters(&self) -> u32 {
        match self {
            CapacityClass::Tube15ml => 15_000,
            CapacityClass::Tube50ml => 50_000,
        }
    }
}

impl TryFrom<u32> for CapacityClass {
    type Error = InvalidCapacityClass;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            15_000 => Ok(CapacityClass::Tube15ml),
            50_000 => Ok(CapacityClass::Tube50ml),
            other => Err(InvalidCapacityClass(other)),
        }
    }
}

impl From<CapacityClass> for u32 {
    fn from(class: CapacityClass) -> Self {
        class.microliters()
    }
}

/// When a distribution swaps its tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipChangePolicy {
    /// One tip for the whole distribution.
    #[default]
    Never,
    /// Fresh tip before every aspiration.
    PerAspirate,
    /// Fresh tip for every destination well.
    PerWell,
}

/// What to do when every attached tip rack is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// Place an additional rack in a free slot.
    #[default]
    AddNewRack,
    /// Pause for the operator to swap the empty rack, then start over.
    ReplaceInPlace,
}

/// A deck slot number. Slots are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u8);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A well on a labware instance placed on the deck.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub slot: SlotId,
    pub labware: String,
    pub well: String,
}

impl Position {
    pub fn new(slot: SlotId, labware: impl Into<String>, well: impl Into<String>) -> Self {
        Self {
            slot,
            labware: labware.into(),
            well: well.into(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} (slot {})", self.well, self.labware, self.slot)
    }
}

/// One device-level step. A plan is the literal, ordered list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    PlaceLabware {
        slot: SlotId,
        kind: String,
        label: String,
    },
    /// Manual fill of a reservoir before the run starts.
    LoadReservoir { position: Position, volume: f64 },
    PickUpTip {
        mount: Mount,
        slot: SlotId,
        well: String,
    },
    /// `depth` is the aspiration height above the well bottom; `None` means
    /// the default bottom clearance.
    Aspirate {
        mount: Mount,
        volume: f64,
        source: Position,
        depth: Option<f64>,
    },
    Dispense {
        mount: Mount,
        volume: f64,
        destination: Position,
    },
    TouchTip { mount: Mount, position: Position },
    DropTip { mount: Mount },
    /// Blocks until the operator acknowledges.
    Pause { message: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::PlaceLabware { slot, kind, label } => {
                write!(f, "place {label} ({kind}) in slot {slot}")
            }
            Action::LoadReservoir { position, volume } => {
                write!(f, "load {volume:.1} µL into {position}")
            }
            Action::PickUpTip { mount, slot, well } => {
                write!(f, "[{mount}] pick up tip {well} from slot {slot}")
            }
            Action::Aspirate {
                mount,
                volume,
                source,
                depth,
            } => match depth {
                Some(d) => write!(f, "[{mount}] aspirate {volume:.2} µL from {source} at {d} mm"),
                None => write!(f, "[{mount}] aspirate {volume:.2} µL from {source}"),
            },
            Action::Dispense {
                mount,
                volume,
                destination,
            } => write!(f, "[{mount}] dispense {volume:.2} µL into {destination}"),
            Action::TouchTip { mount, position } => write!(f, "[{mount}] touch tip at {position}"),
            Action::DropTip { mount } => write!(f, "[{mount}] drop tip"),
            Action::Pause { message } => write!(f, "PAUSE: {message}"),
        }
    }
}
