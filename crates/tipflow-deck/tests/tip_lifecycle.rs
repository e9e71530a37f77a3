//! Tip rack lifecycle across a deck with installed equipment.

use tipflow_core::{Action, LabwareDefinition, Mount, Pipette, Pipettes, ReplacePolicy, SlotId, StaticCatalog};
use tipflow_deck::{Deck, DeckResult, FootprintRules, Operator, ReplacementRequest, ResourcePool, TipRequest};

/// Records every replacement request and how many tips had been picked
/// when the run blocked on it.
#[derive(Default)]
struct Recorder {
    seen: Vec<(ReplacementRequest, usize)>,
    picked_so_far: usize,
}

impl Operator for Recorder {
    fn await_tip_replacement(&mut self, request: &ReplacementRequest) -> DeckResult<()> {
        self.seen.push((request.clone(), self.picked_so_far));
        Ok(())
    }
}

fn tall_rack() -> LabwareDefinition {
    let mut rack = LabwareDefinition::grid("tall_rack", 1, 2, 300.0, 120.0);
    rack.is_tiprack = true;
    rack
}

#[test]
fn racks_avoid_equipment_and_height_limited_neighbours() {
    let mut deck = Deck::new();
    deck.install_equipment("thermocycler", &[SlotId(7), SlotId(8), SlotId(10), SlotId(11)], &[], None)
        .unwrap();
    deck.install_equipment("magnetic module", &[SlotId(1)], &[SlotId(2), SlotId(4)], Some(80.0))
        .unwrap();
    let catalog = StaticCatalog::builtin().with_definitions([tall_rack()]);
    let mut pool = ResourcePool::new(catalog, FootprintRules).with_deck(deck);
    let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 20.0, 300.0)));
    let request = TipRequest::new("tall_rack");

    let mut op = Recorder::default();
    let mut slots = Vec::new();
    for _ in 0..6 {
        for action in pool.tip_acquire(&mut pipettes, Mount::Left, &request, &mut op).unwrap() {
            if let Action::PlaceLabware { slot, .. } = action {
                slots.push(slot);
            }
        }
        pool.tip_release(&mut pipettes, Mount::Left).unwrap();
    }

    // Slots 2 and 4 are too close to the module for a 120 mm rack.
    assert_eq!(slots, vec![SlotId(3), SlotId(5), SlotId(6)]);
    assert!(op.seen.is_empty());
}

#[test]
fn replacement_blocks_before_the_next_pickup() {
    let mut pool = ResourcePool::new(StaticCatalog::builtin().with_definitions([tall_rack()]), FootprintRules);
    let mut pipettes = Pipettes::new(Some(Pipette::new(Mount::Right, 20.0, 300.0)), None);
    let mut request = TipRequest::new("tall_rack");
    request.replace = ReplacePolicy::ReplaceInPlace;

    let mut op = Recorder::default();
    let mut wells = Vec::new();
    for _ in 0..5 {
        op.picked_so_far = pool.tips_picked();
        let actions = pool.tip_acquire(&mut pipettes, Mount::Right, &request, &mut op).unwrap();
        wells.extend(actions.into_iter().filter_map(|a| match a {
            Action::PickUpTip { well, .. } => Some(well),
            _ => None,
        }));
        pool.tip_release(&mut pipettes, Mount::Right).unwrap();
    }

    assert_eq!(wells, vec!["A1", "A2", "A1", "A2", "A1"]);
    assert_eq!(op.seen.len(), 2);
    assert_eq!(op.seen[0].0.slots, vec![SlotId(1)]);
    assert_eq!(op.seen[0].1, 2);
    assert_eq!(op.seen[1].1, 4);
    assert_eq!(pool.racks().len(), 1);
}
