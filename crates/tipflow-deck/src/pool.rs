//! Resource pool: on-demand deck placement and tip pickup.
//!
//! The pool owns the deck and every tip rack. Labware is placed into the
//! first feasible free slot in canonical order. Tip racks are placed lazily:
//! the first pickup for a pipette defines its rack, and later exhaustion is
//! handled according to the configured [`ReplacePolicy`].

use std::collections::BTreeMap;

use tipflow_core::{
    Action, LabwareCatalog, Mount, Pipettes, RackId, ReplacePolicy, SlotId, StaticCatalog,
};
use tracing::{debug, info, warn};

use crate::deck::{Deck, FootprintRules, Labware, PlacementPrimitive};
use crate::error::{DeckError, DeckResult};
use crate::operator::{Operator, ReplacementRequest};
use crate::tiprack::TipRack;

/// Where a pipette gets its tips from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipRequest {
    pub rack_kind: String,
    pub replace: ReplacePolicy,
    /// First tip to use in the first rack, e.g. `"A2"`.
    pub starting_tip: Option<String>,
    /// Both mounts draw from the same racks.
    pub shared_rack: bool,
}

impl TipRequest {
    pub fn new(rack_kind: impl Into<String>) -> Self {
        Self {
            rack_kind: rack_kind.into(),
            replace: ReplacePolicy::default(),
            starting_tip: None,
            shared_rack: false,
        }
    }
}

pub struct ResourcePool<C = StaticCatalog, P = FootprintRules> {
    catalog: C,
    placer: P,
    deck: Deck,
    racks: Vec<TipRack>,
    /// Per-kind counter for generated labels.
    label_counts: BTreeMap<String, usize>,
    tips_picked: usize,
}

impl ResourcePool {
    /// A pool on an empty deck with the built-in catalog.
    pub fn builtin() -> Self {
        Self::new(StaticCatalog::builtin(), FootprintRules)
    }
}

impl<C: LabwareCatalog, P: PlacementPrimitive> ResourcePool<C, P> {
    pub fn new(catalog: C, placer: P) -> Self {
        Self {
            catalog,
            placer,
            deck: Deck::new(),
            racks: Vec::new(),
            label_counts: BTreeMap::new(),
            tips_picked: 0,
        }
    }

    /// Start from a pre-configured deck (equipment installed).
    pub fn with_deck(mut self, deck: Deck) -> Self {
        self.deck = deck;
        self
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn rack(&self, id: RackId) -> Option<&TipRack> {
        self.racks.get(id.0)
    }

    pub fn racks(&self) -> &[TipRack] {
        &self.racks
    }

    /// Total tips picked up so far.
    pub fn tips_picked(&self) -> usize {
        self.tips_picked
    }

    /// Place `count` instances of `kind` into free slots.
    ///
    /// Slots are tried in canonical order; infeasible slots are skipped.
    /// Nothing is placed if fewer than `count` placements succeed.
    pub fn place(
        &mut self,
        kind: &str,
        count: usize,
        labels: Option<&[String]>,
    ) -> DeckResult<BTreeMap<SlotId, String>> {
        let definition = self.catalog.lookup(kind)?;
        let mut placed = BTreeMap::new();

        for slot in self.deck.free_slots() {
            if placed.len() == count {
                break;
            }
            if let Err(conflict) = self.placer.try_place(&self.deck, &definition, slot) {
                debug!(%kind, %conflict, "skipping slot");
                continue;
            }
            let label = match labels.and_then(|l| l.get(placed.len())) {
                Some(label) => label.clone(),
                None => self.next_label(kind),
            };
            self.deck.put(
                slot,
                Labware {
                    label: label.clone(),
                    definition: definition.clone(),
                },
            )?;
            debug!(%slot, %kind, %label, "placed labware");
            placed.insert(slot, label);
        }

        if placed.len() < count {
            for slot in placed.keys() {
                self.deck.remove(*slot);
            }
            warn!(%kind, requested = count, placed = placed.len(), "deck full");
            return Err(DeckError::DeckFull {
                kind: kind.to_string(),
                requested: count,
                placed: placed.len(),
            });
        }

        Ok(placed)
    }

    fn next_label(&mut self, kind: &str) -> String {
        let n = self.label_counts.entry(kind.to_string()).or_insert(0);
        *n += 1;
        format!("{kind} #{n}")
    }

    /// Place a new tip rack and attach it to `mount` (and the other mount
    /// when the rack is shared). The placement is appended to `actions`;
    /// returns the rack's slot.
    pub fn tiprack_define(
        &mut self,
        pipettes: &mut Pipettes,
        mount: Mount,
        rack_kind: &str,
        shared_rack: bool,
        actions: &mut Vec<Action>,
    ) -> DeckResult<SlotId> {
        let id = self.attach_new_rack(pipettes, mount, rack_kind, shared_rack, actions)?;
        Ok(self.racks[id.0].slot)
    }

    fn attach_new_rack(
        &mut self,
        pipettes: &mut Pipettes,
        mount: Mount,
        rack_kind: &str,
        shared_rack: bool,
        actions: &mut Vec<Action>,
    ) -> DeckResult<RackId> {
        if pipettes.get(mount).is_none() {
            return Err(DeckError::NoPipette(mount));
        }
        let definition = self.catalog.lookup(rack_kind)?;
        if !definition.is_tiprack {
            return Err(DeckError::NotATipRack {
                kind: rack_kind.to_string(),
            });
        }
        let placed = self.place(rack_kind, 1, None)?;
        let Some((&slot, label)) = placed.iter().next() else {
            return Err(DeckError::DeckFull {
                kind: rack_kind.to_string(),
                requested: 1,
                placed: 0,
            });
        };

        let id = RackId(self.racks.len());
        self.racks
            .push(TipRack::new(id, slot, rack_kind, definition.well_positions));
        actions.push(Action::PlaceLabware {
            slot,
            kind: rack_kind.to_string(),
            label: label.clone(),
        });

        for m in sharing_mounts(pipettes, mount, shared_rack) {
            if let Some(p) = pipettes.get_mut(m) {
                p.tip_racks.push(id);
            }
        }
        info!(%mount, %slot, kind = %rack_kind, shared = shared_rack, "tip rack attached");
        Ok(id)
    }

    fn starting_offset(&self, request: &TipRequest) -> DeckResult<usize> {
        let Some(tip) = &request.starting_tip else {
            return Ok(0);
        };
        let definition = self.catalog.lookup(&request.rack_kind)?;
        definition
            .index_of(tip)
            .ok_or_else(|| DeckError::InvalidStartingTip {
                tip: tip.clone(),
                kind: request.rack_kind.clone(),
            })
    }

    /// Ensure the pipette on `mount` holds a tip.
    ///
    /// A no-op when a tip is already held. Otherwise picks the next tip,
    /// handling exhaustion by defining the first rack, adding a rack, or
    /// pausing for in-place replacement. Returns the device actions taken.
    pub fn tip_acquire(
        &mut self,
        pipettes: &mut Pipettes,
        mount: Mount,
        request: &TipRequest,
        operator: &mut dyn Operator,
    ) -> DeckResult<Vec<Action>> {
        let pipette = pipettes.get(mount).ok_or(DeckError::NoPipette(mount))?;
        if pipette.has_tip {
            return Ok(Vec::new());
        }
        let has_racks = !pipette.tip_racks.is_empty();

        let mut actions = Vec::new();
        if let Some(pickup) = self.try_pickup(pipettes, mount) {
            actions.push(pickup);
            return Ok(actions);
        }

        if !has_racks {
            let offset = self.starting_offset(request)?;
            let id = self.attach_new_rack(
                pipettes,
                mount,
                &request.rack_kind,
                request.shared_rack,
                &mut actions,
            )?;
            self.racks[id.0].start_at(offset);
            for m in sharing_mounts(pipettes, mount, request.shared_rack) {
                if let Some(p) = pipettes.get_mut(m) {
                    p.starting_tip_offset = offset;
                }
            }
        } else {
            match request.replace {
                ReplacePolicy::AddNewRack => {
                    info!(%mount, "tips exhausted, adding a rack");
                    self.attach_new_rack(
                        pipettes,
                        mount,
                        &request.rack_kind,
                        request.shared_rack,
                        &mut actions,
                    )?;
                }
                ReplacePolicy::ReplaceInPlace => {
                    let rack_ids = pipettes
                        .get(mount)
                        .map(|p| p.tip_racks.clone())
                        .unwrap_or_default();
                    let replacement = ReplacementRequest {
                        mount,
                        rack_kind: request.rack_kind.clone(),
                        slots: rack_ids.iter().map(|id| self.racks[id.0].slot).collect(),
                    };
                    actions.push(Action::Pause {
                        message: replacement.message(),
                    });
                    warn!(%mount, slots = ?replacement.slots, "tips exhausted, waiting for operator");
                    operator.await_tip_replacement(&replacement)?;

                    // Shared racks are the same arena entries, so this
                    // resets both mounts.
                    for id in &rack_ids {
                        self.racks[id.0].reset();
                    }
                    info!(%mount, "tip racks replaced");
                }
            }
        }

        match self.try_pickup(pipettes, mount) {
            Some(pickup) => {
                actions.push(pickup);
                Ok(actions)
            }
            None => Err(DeckError::TipsExhausted(mount)),
        }
    }

    fn try_pickup(&mut self, pipettes: &mut Pipettes, mount: Mount) -> Option<Action> {
        let pipette = pipettes.get_mut(mount)?;
        for id in &pipette.tip_racks {
            let rack = &mut self.racks[id.0];
            if let Some(well) = rack.next_tip() {
                pipette.has_tip = true;
                self.tips_picked += 1;
                debug!(%mount, slot = %rack.slot, %well, "picked up tip");
                return Some(Action::PickUpTip {
                    mount,
                    slot: rack.slot,
                    well,
                });
            }
        }
        None
    }

    /// Drop the held tip into the trash. `None` if no tip was held.
    pub fn tip_release(&mut self, pipettes: &mut Pipettes, mount: Mount) -> DeckResult<Option<Action>> {
        let pipette = pipettes.get_mut(mount).ok_or(DeckError::NoPipette(mount))?;
        if !pipette.has_tip {
            return Ok(None);
        }
        pipette.has_tip = false;
        Ok(Some(Action::DropTip { mount }))
    }
}

fn sharing_mounts(pipettes: &Pipettes, mount: Mount, shared: bool) -> Vec<Mount> {
    let mut mounts = vec![mount];
    if shared && pipettes.get(mount.other()).is_some() {
        mounts.push(mount.other());
    }
    mounts
}
