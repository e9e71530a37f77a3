//! Deck slot arena and placement feasibility.
//!
//! The deck is a fixed array of slot records indexed by slot number. Each
//! slot holds at most one occupant: either owned labware or the footprint
//! of a piece of equipment. Slot 12 carries the fixed trash and is never
//! offered for placement.

use std::collections::BTreeMap;

use thiserror::Error;
use tipflow_core::{LabwareDefinition, SlotId};

use crate::error::{DeckError, DeckResult};

/// Slots available for labware, in canonical placement order.
pub const PLACEABLE_SLOTS: u8 = 11;
/// Slot occupied by the fixed trash.
pub const TRASH_SLOT: SlotId = SlotId(12);

/// A labware instance owned by the deck.
#[derive(Debug, Clone, PartialEq)]
pub struct Labware {
    pub label: String,
    pub definition: LabwareDefinition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Occupant {
    Labware(Labware),
    /// Part of an equipment footprint (module name).
    Equipment(String),
    Trash,
}

#[derive(Debug, Clone)]
struct SlotRecord {
    occupant: Option<Occupant>,
    /// Maximum labware height allowed next to equipment.
    height_limit_mm: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Deck {
    slots: Vec<SlotRecord>,
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

impl Deck {
    pub fn new() -> Self {
        let mut slots = vec![
            SlotRecord {
                occupant: None,
                height_limit_mm: None,
            };
            usize::from(TRASH_SLOT.0)
        ];
        slots[usize::from(TRASH_SLOT.0) - 1].occupant = Some(Occupant::Trash);
        Self { slots }
    }

    fn record(&self, slot: SlotId) -> DeckResult<&SlotRecord> {
        slot.0
            .checked_sub(1)
            .and_then(|i| self.slots.get(usize::from(i)))
            .ok_or(DeckError::InvalidSlot(slot.0))
    }

    fn record_mut(&mut self, slot: SlotId) -> DeckResult<&mut SlotRecord> {
        slot.0
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(usize::from(i)))
            .ok_or(DeckError::InvalidSlot(slot.0))
    }

    /// Mark `slots` as covered by equipment and restrict the height of
    /// labware in `clearance_slots`.
    pub fn install_equipment(
        &mut self,
        name: &str,
        slots: &[SlotId],
        clearance_slots: &[SlotId],
        max_neighbor_height_mm: Option<f64>,
    ) -> DeckResult<()> {
        for &slot in slots {
            let record = self.record_mut(slot)?;
            if record.occupant.is_some() {
                return Err(DeckError::SlotOccupied(slot));
            }
            record.occupant = Some(Occupant::Equipment(name.to_string()));
        }
        if let Some(limit) = max_neighbor_height_mm {
            for &slot in clearance_slots {
                let record = self.record_mut(slot)?;
                record.height_limit_mm = Some(record.height_limit_mm.map_or(limit, |l| l.min(limit)));
            }
        }
        Ok(())
    }

    pub fn occupant(&self, slot: SlotId) -> Option<&Occupant> {
        self.record(slot).ok().and_then(|r| r.occupant.as_ref())
    }

    pub fn labware(&self, slot: SlotId) -> Option<&Labware> {
        match self.occupant(slot) {
            Some(Occupant::Labware(lw)) => Some(lw),
            _ => None,
        }
    }

    pub fn height_limit(&self, slot: SlotId) -> Option<f64> {
        self.record(slot).ok().and_then(|r| r.height_limit_mm)
    }

    pub fn is_free(&self, slot: SlotId) -> bool {
        self.record(slot).is_ok_and(|r| r.occupant.is_none())
    }

    /// Free placeable slots in canonical order.
    pub fn free_slots(&self) -> Vec<SlotId> {
        (1..=PLACEABLE_SLOTS)
            .map(SlotId)
            .filter(|&s| self.is_free(s))
            .collect()
    }

    pub fn put(&mut self, slot: SlotId, labware: Labware) -> DeckResult<()> {
        let record = self.record_mut(slot)?;
        if record.occupant.is_some() {
            return Err(DeckError::SlotOccupied(slot));
        }
        record.occupant = Some(Occupant::Labware(labware));
        Ok(())
    }

    pub fn remove(&mut self, slot: SlotId) -> Option<Labware> {
        let record = self.record_mut(slot).ok()?;
        match record.occupant.take() {
            Some(Occupant::Labware(lw)) => Some(lw),
            other => {
                record.occupant = other;
                None
            }
        }
    }

    /// Labels of all placed labware, by slot.
    pub fn layout(&self) -> BTreeMap<SlotId, String> {
        (1..=PLACEABLE_SLOTS)
            .map(SlotId)
            .filter_map(|s| self.labware(s).map(|lw| (s, lw.label.clone())))
            .collect()
    }
}

/// Why labware cannot go into a given slot.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("slot {slot} rejected: {reason}")]
pub struct SlotConflict {
    pub slot: SlotId,
    pub reason: String,
}

/// Physical feasibility probe for a single slot.
pub trait PlacementPrimitive {
    fn try_place(&self, deck: &Deck, definition: &LabwareDefinition, slot: SlotId) -> Result<(), SlotConflict>;
}

/// Default rules: the slot must be empty and, next to equipment, the
/// labware must fit under the clearance height.
#[derive(Debug, Clone, Copy, Default)]
pub struct FootprintRules;

impl PlacementPrimitive for FootprintRules {
    fn try_place(&self, deck: &Deck, definition: &LabwareDefinition, slot: SlotId) -> Result<(), SlotConflict> {
        if let Some(occupant) = deck.occupant(slot) {
            let reason = match occupant {
                Occupant::Labware(lw) => format!("occupied by {}", lw.label),
                Occupant::Equipment(name) => format!("covered by {name}"),
                Occupant::Trash => "trash".to_string(),
            };
            return Err(SlotConflict { slot, reason });
        }
        if let Some(limit) = deck.height_limit(slot) {
            if definition.height_mm > limit {
                return Err(SlotConflict {
                    slot,
                    reason: format!(
                        "{} is {} mm tall, limit next to equipment is {limit} mm",
                        definition.kind, definition.height_mm
                    ),
                });
            }
        }
        Ok(())
    }
}
