//! Pure status math over the driver x timestep grid.
//!
//! Everything here works on counts, so the engine can feed it either from a
//! `GROUP BY status` query or from rows it already holds.

use std::collections::BTreeMap;

use crate::model::{ScenarioStatus, Timestep, VehicleState, VehicleStatus};

/// Row counts per status for a single timestep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimestepCensus {
    pub pending: usize,
    pub waiting: usize,
    pub active: usize,
    pub crashed: usize,
    pub goal_reached: usize,
}

impl TimestepCensus {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a VehicleState>) -> Self {
        let mut census = Self::default();
        for state in states {
            census.record(state.status, 1);
        }
        census
    }

    pub fn record(&mut self, status: VehicleStatus, count: usize) {
        match status {
            VehicleStatus::Pending => self.pending += count,
            VehicleStatus::Waiting => self.waiting += count,
            VehicleStatus::Active => self.active += count,
            VehicleStatus::Crashed => self.crashed += count,
            VehicleStatus::GoalReached => self.goal_reached += count,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.waiting + self.active + self.crashed + self.goal_reached
    }

    pub fn terminal(&self) -> usize {
        self.crashed + self.goal_reached
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every row is active, crashed or at goal.
    pub fn is_resolved(&self) -> bool {
        !self.is_empty() && self.pending == 0 && self.waiting == 0
    }

    pub fn all_terminal(&self) -> bool {
        !self.is_empty() && self.terminal() == self.total()
    }
}

/// Status of one timestep.
///
/// Without `propagate` a missing timestep yields `None` and a resolved one
/// yields `Active`. With `propagate`, a resolved timestep reports `Done` when
/// the following timestep is resolved too or does not exist, and `Active`
/// when it is the newest resolved step.
pub fn status_at(
    current: &TimestepCensus,
    next: &TimestepCensus,
    propagate: bool,
) -> Option<ScenarioStatus> {
    if current.is_empty() {
        return propagate.then_some(ScenarioStatus::Waiting);
    }

    if current.is_resolved() {
        if !propagate {
            return Some(ScenarioStatus::Active);
        }
        return match status_at(next, &TimestepCensus::default(), false) {
            None | Some(ScenarioStatus::Active) => Some(ScenarioStatus::Done),
            _ => Some(ScenarioStatus::Active),
        };
    }

    Some(ScenarioStatus::Pending)
}

/// Census of every timestep of a scenario.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GridCensus {
    timesteps: BTreeMap<Timestep, TimestepCensus>,
}

impl GridCensus {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a VehicleState>) -> Self {
        let mut grid = Self::default();
        for state in states {
            grid.record(state.timestep, state.status, 1);
        }
        grid
    }

    pub fn record(&mut self, timestep: Timestep, status: VehicleStatus, count: usize) {
        self.timesteps
            .entry(timestep)
            .or_default()
            .record(status, count);
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }

    pub fn at(&self, timestep: Timestep) -> TimestepCensus {
        self.timesteps.get(&timestep).copied().unwrap_or_default()
    }

    /// Last timestep of the contiguous resolved run starting at 0.
    pub fn resolved_frontier(&self) -> Option<Timestep> {
        let mut frontier = None;
        for (timestep, census) in &self.timesteps {
            let contiguous = match frontier {
                None => *timestep == 0,
                Some(previous) => *timestep == previous + 1,
            };
            if !contiguous || !census.is_resolved() {
                break;
            }
            frontier = Some(*timestep);
        }
        frontier
    }

    /// Earliest timestep at which all `driver_count` drivers are terminal.
    pub fn earliest_all_terminal(&self, driver_count: usize) -> Option<Timestep> {
        self.timesteps
            .iter()
            .find(|(_, census)| census.terminal() == driver_count && census.all_terminal())
            .map(|(timestep, _)| *timestep)
    }
}

/// Scenario-wide status.
///
/// `Waiting` until every slot is bound and the grid exists, `Done` once the
/// resolved frontier reaches `duration`, the trimmed end of the grid, or a
/// timestep where every driver is terminal. `Active` otherwise.
pub fn derive_scenario_status(
    grid: &GridCensus,
    duration: Timestep,
    all_slots_bound: bool,
) -> ScenarioStatus {
    if !all_slots_bound || grid.is_empty() {
        return ScenarioStatus::Waiting;
    }

    let Some(frontier) = grid.resolved_frontier() else {
        return ScenarioStatus::Active;
    };

    if frontier >= duration {
        return ScenarioStatus::Done;
    }

    if grid.at(frontier).all_terminal() || grid.at(frontier + 1).is_empty() {
        return ScenarioStatus::Done;
    }

    ScenarioStatus::Active
}
