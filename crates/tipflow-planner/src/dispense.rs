//! Dispense planner: turns one reservoir-to-many distribution into the
//! literal, ordered list of device actions.
//!
//! # State machine
//!
//! ```text
//! Idle ──tip──▶ HasTip(depth) ──run──▶ Depleting ──┬──▶ Depleting (next run)
//!   ▲                                              └──▶ Idle (tip dropped by policy)
//!   └──────────────────────────────────────────────────── Done (all served)
//! ```
//!
//! At every step the planner asks the height model whether the next
//! destination can be served at the current aspiration depth. Runs of
//! destinations that stay within one depth bucket are served together;
//! a destination that would cross a bucket boundary is served in
//! minimum-volume increments with the depth recomputed before each one.
//!
//! Reservoir volume is threaded through the call and returned, never held
//! in shared state. It is decremented only after the matching dispense has
//! been emitted.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tipflow_core::{
    Action, CapacityClass, LabwareCatalog, Mount, Pipettes, Position, TipChangePolicy, VOLUME_EPSILON,
};
use tipflow_deck::{Operator, PlacementPrimitive, ResourcePool, TipRequest};
use tracing::{debug, info};

use crate::decompose;
use crate::error::{PlanError, PlanResult};
use crate::height;
use crate::selector;

/// Tip source for each mount.
pub type TipSources = BTreeMap<Mount, TipRequest>;

/// A bulk liquid container feeding a distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservoir {
    pub position: Position,
    pub capacity: CapacityClass,
    /// Live volume in µL.
    pub volume: f64,
}

/// One source feeding an ordered list of destinations with a fixed volume each.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub source: Position,
    pub destinations: Vec<Position>,
    /// µL per destination.
    pub volume: f64,
    pub tip_policy: TipChangePolicy,
    pub touch_tip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlannerState {
    Idle,
    HasTip { depth: Option<f64> },
    Depleting,
    Done,
}

/// Outcome of a single distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    /// Volume left in the reservoir, reusable by later distributions.
    pub residual_volume: f64,
    pub dispensed_volume: f64,
    /// `(destination, source)` in service order.
    pub layout: Vec<(Position, Position)>,
}

/// Largest number of `per_unit_volume` withdrawals, at most `count_cap`,
/// that leave the reservoir in its current depth bucket.
///
/// Returns 0 when even one withdrawal crosses a threshold.
pub fn max_run(class: CapacityClass, volume: f64, count_cap: usize, per_unit_volume: f64) -> PlanResult<usize> {
    let required = count_cap as f64 * per_unit_volume;
    if volume < required - VOLUME_EPSILON {
        return Err(PlanError::InsufficientVolume {
            available: volume,
            required,
        });
    }
    if count_cap == 0 {
        return Ok(0);
    }

    let depth = height::bucket(class, volume);
    let mut n = 0;
    while n < count_cap && height::bucket(class, volume - (n + 1) as f64 * per_unit_volume) == depth {
        n += 1;
    }
    Ok(n)
}

/// The pipette serving one distribution and its movement limits.
#[derive(Debug, Clone, Copy)]
struct Channel {
    mount: Mount,
    max_transfer: f64,
    min_volume: f64,
}

pub struct DispensePlanner<'a, C, P> {
    pool: &'a mut ResourcePool<C, P>,
    pipettes: &'a mut Pipettes,
    tips: &'a TipSources,
    operator: &'a mut dyn Operator,
    actions: Vec<Action>,
    state: PlannerState,
    /// Mounts whose current tip has touched liquid.
    wet_tips: BTreeSet<Mount>,
}

impl<'a, C: LabwareCatalog, P: PlacementPrimitive> DispensePlanner<'a, C, P> {
    pub fn new(
        pool: &'a mut ResourcePool<C, P>,
        pipettes: &'a mut Pipettes,
        tips: &'a TipSources,
        operator: &'a mut dyn Operator,
    ) -> Self {
        Self {
            pool,
            pipettes,
            tips,
            operator,
            actions: Vec::new(),
            state: PlannerState::Idle,
            wet_tips: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    /// Serve every destination of `request` from `reservoir`.
    pub fn distribute(&mut self, request: &TransferRequest, reservoir: &Reservoir) -> PlanResult<Distribution> {
        let per = request.volume;
        let count = request.destinations.len();
        let class = reservoir.capacity;
        let mut volume = reservoir.volume;

        if count == 0 {
            return Ok(Distribution {
                residual_volume: volume,
                dispensed_volume: 0.0,
                layout: Vec::new(),
            });
        }
        let required = per * count as f64;
        if volume + VOLUME_EPSILON < required {
            return Err(PlanError::InsufficientVolume {
                available: volume,
                required,
            });
        }

        let channel = self.channel(per)?;
        let mount = channel.mount;

        // Only a reused tip can carry several destinations in one aspiration.
        let batching = request.tip_policy == TipChangePolicy::Never && per <= channel.max_transfer + VOLUME_EPSILON;
        let batch_cap = if batching {
            ((channel.max_transfer + VOLUME_EPSILON) / per).floor() as usize
        } else {
            count
        };

        info!(
            source = %request.source,
            destinations = count,
            per_destination = per,
            volume,
            %mount,
            policy = ?request.tip_policy,
            "distribution started"
        );

        let mut layout = Vec::with_capacity(count);
        let mut served = 0;
        self.state = PlannerState::Idle;

        while served < count {
            self.ensure_tip(mount)?;
            let depth = height::bucket(class, volume);
            self.state = PlannerState::HasTip { depth: Some(depth) };

            let cap = (count - served).min(batch_cap);
            let run = max_run(class, volume, cap, per)?;
            self.state = PlannerState::Depleting;

            if run > 0 {
                let dests = &request.destinations[served..served + run];
                debug!(run, depth, volume, "serving at constant depth");
                if batching {
                    self.multi_dispense(mount, request, dests, depth)?;
                    volume -= per * run as f64;
                } else {
                    for dest in dests {
                        self.move_volume(channel, request, &request.source, dest, Some(depth))?;
                        volume -= per;
                        self.finish_destination(mount, request.tip_policy)?;
                    }
                }
                layout.extend(dests.iter().map(|d| (d.clone(), request.source.clone())));
                served += run;
            } else {
                let dest = &request.destinations[served];
                debug!(volume, depth, "depth boundary ahead, serving in minimum increments");
                self.fallback_transfer(channel, request, class, dest, &mut volume)?;
                self.finish_destination(mount, request.tip_policy)?;
                layout.push((dest.clone(), request.source.clone()));
                served += 1;
            }
        }

        self.release_tip(mount)?;
        self.state = PlannerState::Done;
        info!(source = %request.source, residual = volume, "distribution done");

        Ok(Distribution {
            residual_volume: volume,
            dispensed_volume: reservoir.volume - volume,
            layout,
        })
    }

    /// One-to-one transfers of `volume` µL from each pair's source to its
    /// destination, aspirating at the default bottom clearance.
    pub fn transfer(
        &mut self,
        pairs: &[(Position, Position)],
        volume: f64,
        tip_policy: TipChangePolicy,
        touch_tip: bool,
    ) -> PlanResult<Vec<(Position, Position)>> {
        let mut layout = Vec::with_capacity(pairs.len());
        let Some((first_source, _)) = pairs.first() else {
            return Ok(layout);
        };

        let channel = self.channel(volume)?;
        let mount = channel.mount;
        let request = TransferRequest {
            source: first_source.clone(),
            destinations: Vec::new(),
            volume,
            tip_policy,
            touch_tip,
        };
        info!(pairs = pairs.len(), volume, %mount, "transfers started");

        for (source, dest) in pairs {
            self.ensure_tip(mount)?;
            self.state = PlannerState::Depleting;
            self.move_volume(channel, &request, source, dest, None)?;
            self.finish_destination(mount, tip_policy)?;
            layout.push((dest.clone(), source.clone()));
        }

        self.release_tip(mount)?;
        self.state = PlannerState::Done;
        Ok(layout)
    }

    fn channel(&self, volume: f64) -> PlanResult<Channel> {
        let mount = selector::select_from(self.pipettes, volume)?;
        let pipette = self.pipettes.get(mount).ok_or(PlanError::NoPipetteAttached)?;
        Ok(Channel {
            mount,
            max_transfer: pipette.max_transfer(),
            min_volume: pipette.min_volume,
        })
    }

    /// Aspirate for the whole run once, then dispense into each destination.
    fn multi_dispense(&mut self, mount: Mount, request: &TransferRequest, dests: &[Position], depth: f64) -> PlanResult<()> {
        self.begin_aspirate(mount, request.tip_policy)?;
        self.aspirate(mount, request.volume * dests.len() as f64, &request.source, Some(depth));
        for dest in dests {
            self.dispense(mount, request.volume, dest);
            if request.touch_tip {
                self.touch_tip(mount, dest);
            }
        }
        Ok(())
    }

    /// Move `request.volume` into one destination, split into feasible
    /// movements when it reaches the transfer limit.
    fn move_volume(
        &mut self,
        channel: Channel,
        request: &TransferRequest,
        source: &Position,
        dest: &Position,
        depth: Option<f64>,
    ) -> PlanResult<()> {
        let mount = channel.mount;
        let movements = if request.volume + VOLUME_EPSILON >= channel.max_transfer {
            decompose::split(request.volume, channel.max_transfer, channel.min_volume)?
        } else {
            vec![request.volume]
        };
        for amount in movements {
            self.begin_aspirate(mount, request.tip_policy)?;
            self.aspirate(mount, amount, source, depth);
            self.dispense(mount, amount, dest);
        }
        if request.touch_tip {
            self.touch_tip(mount, dest);
        }
        Ok(())
    }

    /// Serve one destination in minimum-volume movements, re-reading the
    /// depth before each so the tip never aspirates above the surface.
    fn fallback_transfer(
        &mut self,
        channel: Channel,
        request: &TransferRequest,
        class: CapacityClass,
        dest: &Position,
        volume: &mut f64,
    ) -> PlanResult<()> {
        let mount = channel.mount;
        for amount in decompose::min_increments(request.volume, channel.min_volume, channel.max_transfer)? {
            let depth = height::bucket(class, *volume);
            self.begin_aspirate(mount, request.tip_policy)?;
            self.aspirate(mount, amount, &request.source, Some(depth));
            self.dispense(mount, amount, dest);
            *volume -= amount;
        }
        if request.touch_tip {
            self.touch_tip(mount, dest);
        }
        Ok(())
    }

    fn begin_aspirate(&mut self, mount: Mount, policy: TipChangePolicy) -> PlanResult<()> {
        if policy == TipChangePolicy::PerAspirate && self.wet_tips.contains(&mount) {
            self.release_tip(mount)?;
        }
        self.ensure_tip(mount)
    }

    fn finish_destination(&mut self, mount: Mount, policy: TipChangePolicy) -> PlanResult<()> {
        if policy == TipChangePolicy::PerWell {
            self.release_tip(mount)?;
        }
        Ok(())
    }

    fn ensure_tip(&mut self, mount: Mount) -> PlanResult<()> {
        let tips: &TipSources = self.tips;
        let request = tips.get(&mount).ok_or(PlanError::NoTipSource(mount))?;
        let actions = self
            .pool
            .tip_acquire(&mut *self.pipettes, mount, request, &mut *self.operator)?;
        if !actions.is_empty() {
            self.wet_tips.remove(&mount);
            if self.state == PlannerState::Idle {
                self.state = PlannerState::HasTip { depth: None };
            }
        }
        self.actions.extend(actions);
        Ok(())
    }

    fn release_tip(&mut self, mount: Mount) -> PlanResult<()> {
        if let Some(drop) = self.pool.tip_release(&mut *self.pipettes, mount)? {
            self.actions.push(drop);
        }
        self.wet_tips.remove(&mount);
        self.state = PlannerState::Idle;
        Ok(())
    }

    fn aspirate(&mut self, mount: Mount, volume: f64, source: &Position, depth: Option<f64>) {
        self.wet_tips.insert(mount);
        self.actions.push(Action::Aspirate {
            mount,
            volume,
            source: source.clone(),
            depth,
        });
    }

    fn dispense(&mut self, mount: Mount, volume: f64, destination: &Position) {
        self.actions.push(Action::Dispense {
            mount,
            volume,
            destination: destination.clone(),
        });
    }

    fn touch_tip(&mut self, mount: Mount, position: &Position) {
        self.actions.push(Action::TouchTip {
            mount,
            position: position.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipflow_core::{Pipette, SlotId};
    use tipflow_deck::AutoAcknowledge;

    fn pos(well: &str) -> Position {
        Position::new(SlotId(2), "plate", well)
    }

    fn source() -> Position {
        Position::new(SlotId(1), "mix", "A1")
    }

    fn tips_for(mount: Mount, kind: &str) -> TipSources {
        BTreeMap::from([(mount, TipRequest::new(kind))])
    }

    fn request(count: usize, volume: f64, tip_policy: TipChangePolicy) -> TransferRequest {
        TransferRequest {
            source: source(),
            destinations: (1..=count).map(|i| pos(&format!("A{i}"))).collect(),
            volume,
            tip_policy,
            touch_tip: false,
        }
    }

    fn count<F: Fn(&Action) -> bool>(actions: &[Action], f: F) -> usize {
        actions.iter().filter(|a| f(a)).count()
    }

    #[test]
    fn max_run_stops_at_threshold() {
        let c = CapacityClass::Tube15ml;
        assert_eq!(max_run(c, 14000.0, 20, 500.0).unwrap(), 9);
        assert_eq!(max_run(c, 14000.0, 2, 500.0).unwrap(), 2);
        assert_eq!(max_run(c, 9500.0, 5, 500.0).unwrap(), 0);
        assert_eq!(max_run(c, 9000.0, 0, 500.0).unwrap(), 0);
    }

    #[test]
    fn max_run_insufficient_volume() {
        assert!(matches!(
            max_run(CapacityClass::Tube15ml, 1000.0, 3, 500.0),
            Err(PlanError::InsufficientVolume { .. })
        ));
    }

    #[test]
    fn never_policy_batches_into_one_aspiration() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 20.0, 300.0)));
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_300ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 2000.0,
        };
        let out = planner
            .distribute(&request(3, 100.0, TipChangePolicy::Never), &reservoir)
            .unwrap();

        assert_eq!(out.residual_volume, 1700.0);
        assert_eq!(out.layout.len(), 3);
        assert_eq!(planner.state(), PlannerState::Done);
        let actions = planner.into_actions();
        assert_eq!(count(&actions, |a| matches!(a, Action::PickUpTip { .. })), 1);
        assert_eq!(count(&actions, |a| matches!(a, Action::DropTip { .. })), 1);
        let aspirates: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Aspirate { volume, depth, .. } => Some((*volume, *depth)),
                _ => None,
            })
            .collect();
        assert_eq!(aspirates, vec![(300.0, Some(1.0))]);
    }

    #[test]
    fn per_well_policy_changes_tip_each_destination() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 20.0, 300.0)));
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_300ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 2000.0,
        };
        planner
            .distribute(&request(4, 400.0, TipChangePolicy::PerWell), &reservoir)
            .unwrap();
        let actions = planner.into_actions();
        assert_eq!(count(&actions, |a| matches!(a, Action::PickUpTip { .. })), 4);
        assert_eq!(count(&actions, |a| matches!(a, Action::DropTip { .. })), 4);
        // 400 µL with a 300 µL pipette: 300 + 100 per well.
        assert_eq!(count(&actions, |a| matches!(a, Action::Aspirate { .. })), 8);
    }

    #[test]
    fn per_aspirate_policy_changes_tip_each_movement() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 20.0, 300.0)));
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_300ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 2000.0,
        };
        planner
            .distribute(&request(2, 450.0, TipChangePolicy::PerAspirate), &reservoir)
            .unwrap();
        let actions = planner.into_actions();
        // 450 = 300 + 150 per well, two wells.
        assert_eq!(count(&actions, |a| matches!(a, Action::Aspirate { .. })), 4);
        assert_eq!(count(&actions, |a| matches!(a, Action::PickUpTip { .. })), 4);
        // Every aspirate directly follows a pickup.
        for (i, a) in actions.iter().enumerate() {
            if matches!(a, Action::Aspirate { .. }) {
                assert!(matches!(actions[i - 1], Action::PickUpTip { .. }));
            }
        }
    }

    #[test]
    fn fallback_reads_depth_before_each_increment() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 100.0, 1000.0)));
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_1000ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        // 3050 µL sits just above the 3000 µL threshold.
        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 3050.0,
        };
        let out = planner
            .distribute(&request(1, 250.0, TipChangePolicy::Never), &reservoir)
            .unwrap();
        assert_eq!(out.residual_volume, 2800.0);

        let moves: Vec<_> = planner
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::Aspirate { volume, depth, .. } => Some((*volume, *depth)),
                _ => None,
            })
            .collect();
        assert_eq!(moves, vec![(100.0, Some(25.0)), (150.0, Some(1.0))]);
    }

    #[test]
    fn insufficient_reservoir_fails_before_motion() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 20.0, 300.0)));
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_300ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 250.0,
        };
        let err = planner
            .distribute(&request(3, 100.0, TipChangePolicy::Never), &reservoir)
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::InsufficientVolume {
                available: 250.0,
                required: 300.0,
            }
        );
        assert!(planner.actions().is_empty());
    }

    #[test]
    fn unsuitable_volume_aborts() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(None, Some(Pipette::new(Mount::Left, 20.0, 300.0)));
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_300ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 2000.0,
        };
        let err = planner
            .distribute(&request(3, 5.0, TipChangePolicy::Never), &reservoir)
            .unwrap_err();
        assert_eq!(err, PlanError::NotSuitablePipette(5.0));
    }

    #[test]
    fn missing_tip_source_is_error() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(Some(Pipette::new(Mount::Right, 1.0, 20.0)), None);
        let tips = tips_for(Mount::Left, "opentrons_96_tiprack_20ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let reservoir = Reservoir {
            position: source(),
            capacity: CapacityClass::Tube15ml,
            volume: 200.0,
        };
        let err = planner
            .distribute(&request(2, 10.0, TipChangePolicy::Never), &reservoir)
            .unwrap_err();
        assert_eq!(err, PlanError::NoTipSource(Mount::Right));
    }

    #[test]
    fn transfer_pairs_with_touch_tip() {
        let mut pool = ResourcePool::builtin();
        let mut pipettes = Pipettes::new(Some(Pipette::new(Mount::Right, 1.0, 20.0)), None);
        let tips = tips_for(Mount::Right, "opentrons_96_tiprack_20ul");
        let mut op = AutoAcknowledge::default();
        let mut planner = DispensePlanner::new(&mut pool, &mut pipettes, &tips, &mut op);

        let pairs = vec![
            (Position::new(SlotId(3), "samples", "A1"), pos("A1")),
            (Position::new(SlotId(3), "samples", "B1"), pos("B1")),
        ];
        let layout = planner
            .transfer(&pairs, 5.0, TipChangePolicy::PerWell, true)
            .unwrap();
        assert_eq!(layout[1], (pos("B1"), Position::new(SlotId(3), "samples", "B1")));

        let actions = planner.into_actions();
        assert_eq!(count(&actions, |a| matches!(a, Action::TouchTip { .. })), 2);
        assert_eq!(count(&actions, |a| matches!(a, Action::PickUpTip { .. })), 2);
        assert!(actions.iter().all(|a| !matches!(a, Action::Aspirate { depth: Some(_), .. })));
    }
}
