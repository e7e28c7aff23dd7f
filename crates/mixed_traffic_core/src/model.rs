use serde::{Deserialize, Serialize};

pub type ScenarioId = i64;
pub type DriverId = i64;
pub type Timestep = u32;

/// Lifecycle of one (driver, timestep) cell.
///
/// Transitions only move forward: `Pending -> Waiting -> Active -> {Crashed,
/// GoalReached}`. The two terminal states are absorbing. The single backward
/// edge is the tail reset after a submission, which returns speculative
/// `Waiting` rows to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Pending,
    Waiting,
    Active,
    Crashed,
    GoalReached,
}

impl VehicleStatus {
    pub const TERMINAL: [VehicleStatus; 2] = [VehicleStatus::Crashed, VehicleStatus::GoalReached];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Waiting => "WAITING",
            Self::Active => "ACTIVE",
            Self::Crashed => "CRASHED",
            Self::GoalReached => "GOAL_REACHED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "WAITING" => Some(Self::Waiting),
            "ACTIVE" => Some(Self::Active),
            "CRASHED" => Some(Self::Crashed),
            "GOAL_REACHED" => Some(Self::GoalReached),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Crashed | Self::GoalReached)
    }

    /// Finalized for its timestep: accepted, crashed or at goal.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Active | Self::Crashed | Self::GoalReached)
    }
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Waiting,
    Pending,
    Active,
    Done,
}

impl ScenarioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Done => "DONE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "WAITING" => Some(Self::Waiting),
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "DONE" => Some(Self::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub speed: f64,
    pub acceleration: f64,
}

impl Kinematics {
    pub fn at_rest(x: f64, y: f64, rotation: f64) -> Self {
        Self {
            x,
            y,
            rotation,
            speed: 0.0,
            acceleration: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.rotation, self.speed, self.acceleration]
            .iter()
            .all(|value| value.is_finite())
    }

    pub fn distance_to(&self, other: &Kinematics) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One cell of the driver x timestep grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub driver_id: DriverId,
    pub timestep: Timestep,
    pub status: VehicleStatus,
    /// `None` exactly while the row is `Pending`.
    pub kinematics: Option<Kinematics>,
}

impl VehicleState {
    pub fn pending(driver_id: DriverId, timestep: Timestep) -> Self {
        Self {
            driver_id,
            timestep,
            status: VehicleStatus::Pending,
            kinematics: None,
        }
    }

    pub fn with_status(&self, status: VehicleStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Participant {
    Human { user_id: String },
    Autonomous { agent: String },
}

impl Participant {
    pub fn is_autonomous(&self) -> bool {
        matches!(self, Self::Autonomous { .. })
    }
}

/// Oriented rectangle a driver must reach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalRegion {
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
    /// Radians, counter-clockwise from the x axis.
    pub orientation: f64,
}

impl GoalRegion {
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.length, self.width, self.orientation]
            .iter()
            .all(|value| value.is_finite())
            && self.length > 0.0
            && self.width > 0.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (sin, cos) = self.orientation.sin_cos();
        let dx = x - self.x;
        let dy = y - self.y;
        let along = dx * cos + dy * sin;
        let across = -dx * sin + dy * cos;
        along.abs() <= self.length / 2.0 && across.abs() <= self.width / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub scenario_id: ScenarioId,
    pub participant: Option<Participant>,
    pub initial: Kinematics,
    pub goal: GoalRegion,
}

impl Driver {
    pub fn is_bound(&self) -> bool {
        self.participant.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    pub duration: Timestep,
    pub max_participants: u32,
    pub status: ScenarioStatus,
    pub created_at: String,
}
