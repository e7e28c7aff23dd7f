use mixed_traffic_core::{DriverId, ScenarioId, Timestep};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Published after the unit of work that resolved `timestep` has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestepResolved {
    pub scenario_id: ScenarioId,
    pub timestep: Timestep,
    /// Autonomous drivers still in play that should plan from this timestep.
    pub autonomous_drivers: Vec<DriverId>,
}

/// Subscription point for external schedulers. The engine never blocks on
/// or retries a hook; implementations hand the event off and return.
pub trait TimestepResolvedHook: Send + Sync {
    fn on_timestep_resolved(&self, event: &TimestepResolved);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl TimestepResolvedHook for NoopHook {
    fn on_timestep_resolved(&self, _event: &TimestepResolved) {}
}

/// Forwards events to an async scheduler through an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHook {
    sender: UnboundedSender<TimestepResolved>,
}

impl ChannelHook {
    pub fn new(sender: UnboundedSender<TimestepResolved>) -> Self {
        Self { sender }
    }
}

impl TimestepResolvedHook for ChannelHook {
    fn on_timestep_resolved(&self, event: &TimestepResolved) {
        if self.sender.send(event.clone()).is_err() {
            warn!(
                component = "timestep_hook",
                event = "subscriber_gone",
                scenario_id = event.scenario_id,
                timestep = event.timestep,
            );
        }
    }
}
