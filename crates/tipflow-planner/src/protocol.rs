//! Whole-run orchestration.
//!
//! Setup happens once before any motion: destination plates, reservoir
//! racks, and the sample plate are placed, and the tube balancer decides
//! how many reservoirs the reagent needs. Each reservoir then feeds its
//! share of the destination wells through the dispense planner, followed
//! by the optional one-to-one sample transfers.

use std::collections::{BTreeMap, HashMap};

use tipflow_core::config::{ConfigError, RunConfig};
use tipflow_core::{
    Action, LabwareCatalog, LabwareDefinition, Pipette, Pipettes, Position, SlotId, StaticCatalog,
};
use tipflow_deck::{Deck, DeckError, FootprintRules, Operator, PlacementPrimitive, ResourcePool, TipRequest};
use tracing::info;

use crate::balancer;
use crate::dispense::{DispensePlanner, Reservoir, TipSources, TransferRequest};
use crate::error::{PlanError, PlanResult};
use crate::report::{LayoutEntry, ReservoirReport, RunReport};

pub struct Protocol<C = StaticCatalog, P = FootprintRules> {
    config: RunConfig,
    pool: ResourcePool<C, P>,
    pipettes: Pipettes,
    tips: TipSources,
}

impl Protocol {
    /// Built-in catalog extended with the config's own labware.
    pub fn from_config(config: RunConfig) -> PlanResult<Self> {
        let catalog = StaticCatalog::builtin().with_definitions(config.labware.clone());
        Self::new(config, catalog, FootprintRules)
    }
}

impl<C: LabwareCatalog, P: PlacementPrimitive> Protocol<C, P> {
    pub fn new(config: RunConfig, catalog: C, placer: P) -> PlanResult<Self> {
        config.validate()?;

        let mut deck = Deck::new();
        for eq in &config.deck.equipment {
            let slots: Vec<SlotId> = eq.slots.iter().copied().map(SlotId).collect();
            let clearance: Vec<SlotId> = eq.clearance_slots.iter().copied().map(SlotId).collect();
            deck.install_equipment(&eq.name, &slots, &clearance, eq.max_neighbor_height_mm)?;
        }

        let mut pipettes = Pipettes::default();
        let mut tips = TipSources::new();
        for pc in &config.pipettes {
            let tip_capacity = pc.tip_capacity.unwrap_or(pc.max_volume);
            pipettes.mount(Pipette::new(pc.mount, pc.min_volume, pc.max_volume).with_tip_capacity(tip_capacity));
            tips.insert(
                pc.mount,
                TipRequest {
                    rack_kind: pc.tip_rack.clone(),
                    replace: config.tips.replace,
                    starting_tip: pc.starting_tip.clone(),
                    shared_rack: config.tips.shared_rack,
                },
            );
        }
        if config.tips.shared_rack {
            let mut kinds: Vec<&str> = config.pipettes.iter().map(|p| p.tip_rack.as_str()).collect();
            kinds.dedup();
            if kinds.len() > 1 {
                return Err(invalid("tips.shared_rack", "pipettes use different tip racks"));
            }
        }

        Ok(Self {
            config,
            pool: ResourcePool::new(catalog, placer).with_deck(deck),
            pipettes,
            tips,
        })
    }

    pub fn pool(&self) -> &ResourcePool<C, P> {
        &self.pool
    }

    pub fn pipettes(&self) -> &Pipettes {
        &self.pipettes
    }

    /// Plan and record the whole run.
    pub fn run(&mut self, operator: &mut dyn Operator) -> PlanResult<RunReport> {
        let config = self.config.clone();
        let reagent = &config.reagent;
        let mut actions = Vec::new();

        // Destination plates.
        let plate = self.lookup(&config.destination.plate)?;
        if plate.well_count() == 0 {
            return Err(invalid("destination.plate", "labware has no wells"));
        }
        let reactions = config.destination.reactions as usize;
        let plate_count = reactions.div_ceil(plate.well_count());
        let destination_wells = self.place_wells(
            &config.destination.plate,
            &numbered(&config.destination.label, plate_count),
            &plate,
            &mut actions,
        )?;

        // Reservoirs.
        let capacity = f64::from(reagent.capacity_class.microliters());
        let max_tube = capacity * reagent.fill_fraction - reagent.dead_volume;
        let batch = balancer::plan(reagent.volume_per_reaction, config.destination.reactions, max_tube)?;
        let rack = self.lookup(&reagent.tube_rack)?;
        if rack.well_count() == 0 || (rack.capacity_per_well - capacity).abs() > f64::EPSILON {
            return Err(invalid(
                "reagent.tube_rack",
                &format!("{} does not hold {} µL tubes", reagent.tube_rack, capacity),
            ));
        }
        let rack_count = batch.tube_count.div_ceil(rack.well_count());
        let tubes = self.place_wells(
            &reagent.tube_rack,
            &numbered(&reagent.name, rack_count),
            &rack,
            &mut actions,
        )?;

        let reservoirs: Vec<Reservoir> = tubes
            .into_iter()
            .zip(&batch.volume_per_tube)
            .map(|(position, &volume)| Reservoir {
                position,
                capacity: reagent.capacity_class,
                volume: volume + reagent.dead_volume,
            })
            .collect();
        for r in &reservoirs {
            actions.push(Action::LoadReservoir {
                position: r.position.clone(),
                volume: r.volume,
            });
        }
        info!(
            tubes = batch.tube_count,
            reactions,
            per_reaction = reagent.volume_per_reaction,
            "reservoirs balanced"
        );

        // Sample plate.
        let sample_pairs = match &config.samples {
            Some(samples) => {
                let def = self.lookup(&samples.plate)?;
                if let Some(missing) = samples.wells.iter().find(|w| def.index_of(w).is_none()) {
                    return Err(invalid("samples.wells", &format!("{missing} is not a well of {}", samples.plate)));
                }
                let placed = self.pool.place(&samples.plate, 1, Some(&["samples".to_string()][..]))?;
                record_placements(&placed, &samples.plate, &mut actions);
                let (&slot, label) = placed
                    .iter()
                    .next()
                    .ok_or_else(|| invalid("samples.plate", "not placed"))?;
                samples
                    .wells
                    .iter()
                    .map(|w| Position::new(slot, label.clone(), w.clone()))
                    .zip(destination_wells.iter().cloned())
                    .collect::<Vec<_>>()
            }
            None => Vec::new(),
        };

        // Motion.
        let mut planner = DispensePlanner::new(&mut self.pool, &mut self.pipettes, &self.tips, operator);
        let mut layout = LayoutBuilder::default();
        let mut reservoir_reports = Vec::with_capacity(reservoirs.len());
        let mut offset = 0;

        for (reservoir, &count) in reservoirs.iter().zip(&batch.reactions_per_tube) {
            let end = offset + count as usize;
            let request = TransferRequest {
                source: reservoir.position.clone(),
                destinations: destination_wells[offset..end].to_vec(),
                volume: reagent.volume_per_reaction,
                tip_policy: reagent.tip_policy,
                touch_tip: reagent.touch_tip,
            };
            offset = end;

            let outcome = planner.distribute(&request, reservoir)?;
            layout.extend(&outcome.layout);
            reservoir_reports.push(ReservoirReport {
                position: reservoir.position.clone(),
                loaded_volume: reservoir.volume,
                reactions: count,
                residual_volume: outcome.residual_volume,
            });
        }

        if let Some(samples) = &config.samples {
            let pairs = planner.transfer(&sample_pairs, samples.volume, samples.tip_policy, samples.touch_tip)?;
            layout.extend(&pairs);
        }

        actions.extend(planner.into_actions());
        let tips_used = self.pool.tips_picked();
        info!(steps = actions.len(), tips_used, "run planned");

        Ok(RunReport {
            name: config.run.name.clone(),
            batch,
            reservoirs: reservoir_reports,
            layout: layout.entries,
            tips_used,
            actions,
        })
    }

    fn lookup(&self, kind: &str) -> PlanResult<LabwareDefinition> {
        Ok(self.pool.catalog().lookup(kind).map_err(DeckError::from)?)
    }

    /// Place one instance per label and return all their wells in order.
    fn place_wells(
        &mut self,
        kind: &str,
        labels: &[String],
        definition: &LabwareDefinition,
        actions: &mut Vec<Action>,
    ) -> PlanResult<Vec<Position>> {
        let placed = self.pool.place(kind, labels.len(), Some(labels))?;
        record_placements(&placed, kind, actions);
        Ok(placed
            .iter()
            .flat_map(|(&slot, label)| {
                definition
                    .well_positions
                    .iter()
                    .map(move |w| Position::new(slot, label.clone(), w.clone()))
            })
            .collect())
    }
}

fn record_placements(placed: &BTreeMap<SlotId, String>, kind: &str, actions: &mut Vec<Action>) {
    for (&slot, label) in placed {
        actions.push(Action::PlaceLabware {
            slot,
            kind: kind.to_string(),
            label: label.clone(),
        });
    }
}

/// `["name"]` for one instance, `["name 1", "name 2", ...]` otherwise.
fn numbered(name: &str, count: usize) -> Vec<String> {
    if count == 1 {
        vec![name.to_string()]
    } else {
        (1..=count).map(|i| format!("{name} {i}")).collect()
    }
}

fn invalid(field: &str, reason: &str) -> PlanError {
    PlanError::Config(ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    })
}

#[derive(Default)]
struct LayoutBuilder {
    entries: Vec<LayoutEntry>,
    index: HashMap<Position, usize>,
}

impl LayoutBuilder {
    fn extend(&mut self, pairs: &[(Position, Position)]) {
        for (dest, source) in pairs {
            let i = *self.index.entry(dest.clone()).or_insert_with(|| {
                self.entries.push(LayoutEntry {
                    destination: dest.clone(),
                    sources: Vec::new(),
                });
                self.entries.len() - 1
            });
            self.entries[i].sources.push(source.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipflow_core::{CapacityClass, Mount};
    use tipflow_deck::AutoAcknowledge;

    #[test]
    fn numbered_labels() {
        assert_eq!(numbered("mix", 1), vec!["mix"]);
        assert_eq!(numbered("mix", 2), vec!["mix 1", "mix 2"]);
    }

    #[test]
    fn layout_groups_sources_per_destination() {
        let d = Position::new(SlotId(1), "plate", "A1");
        let s1 = Position::new(SlotId(2), "mix", "A1");
        let s2 = Position::new(SlotId(3), "samples", "A1");
        let mut layout = LayoutBuilder::default();
        layout.extend(&[(d.clone(), s1.clone())]);
        layout.extend(&[(d.clone(), s2.clone())]);
        assert_eq!(layout.entries.len(), 1);
        assert_eq!(layout.entries[0].sources, vec![s1.to_string(), s2.to_string()]);
    }

    #[test]
    fn scaffold_runs_end_to_end() {
        let config = RunConfig::scaffold("scaffold");
        let mut protocol = Protocol::from_config(config).unwrap();
        let report = protocol.run(&mut AutoAcknowledge::default()).unwrap();

        assert_eq!(report.batch.tube_count, 1);
        assert_eq!(report.layout.len(), 96);
        assert_eq!(report.reservoirs[0].position.well, "A1");
        assert!(report.reservoirs[0].residual_volume.abs() < 0.001);
        // 15 µL per reaction goes to the 20 µL pipette on the right.
        assert!(report
            .actions
            .iter()
            .filter(|a| matches!(a, Action::Aspirate { .. }))
            .all(|a| matches!(a, Action::Aspirate { mount: Mount::Right, .. })));
    }

    #[test]
    fn wrong_tube_rack_rejected() {
        let mut config = RunConfig::scaffold("bad-rack");
        config.reagent.capacity_class = CapacityClass::Tube50ml;
        let mut protocol = Protocol::from_config(config).unwrap();
        let err = protocol.run(&mut AutoAcknowledge::default()).unwrap_err();
        assert!(matches!(
            err,
            PlanError::Config(ConfigError::Invalid { ref field, .. }) if field == "reagent.tube_rack"
        ));
    }
}
