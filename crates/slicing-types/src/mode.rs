//! Operating modes and traffic classes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating mode of the slicing controller.
///
/// The mode is the `(exam, simulation)` flag pair; each of the four
/// combinations is its own variant so a half-updated pair cannot be
/// represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Neither exam nor simulation: shared forwarding for everybody.
    #[default]
    Default,
    /// Student traffic is dropped.
    Exam,
    /// Reserved researcher traffic takes the alternate path, the rest is queued.
    Simulation,
    /// Exam drop first, then simulation rules.
    #[serde(rename = "exam_and_simulation")]
    ExamSimulation,
}

impl Mode {
    /// All four modes, in flag order.
    pub const ALL: [Mode; 4] = [
        Mode::Default,
        Mode::Exam,
        Mode::Simulation,
        Mode::ExamSimulation,
    ];

    /// Builds the mode for an `(exam, simulation)` flag pair.
    pub const fn from_flags(exam: bool, simulation: bool) -> Self {
        match (exam, simulation) {
            (false, false) => Mode::Default,
            (true, false) => Mode::Exam,
            (false, true) => Mode::Simulation,
            (true, true) => Mode::ExamSimulation,
        }
    }

    /// Returns true if student traffic is blocked.
    pub const fn exam(&self) -> bool {
        matches!(self, Mode::Exam | Mode::ExamSimulation)
    }

    /// Returns true if the simulation rules are active.
    pub const fn simulation(&self) -> bool {
        matches!(self, Mode::Simulation | Mode::ExamSimulation)
    }

    /// Returns the `(exam, simulation)` pair.
    pub const fn flags(&self) -> (bool, bool) {
        (self.exam(), self.simulation())
    }

    /// Returns true for the default mode.
    pub const fn is_default(&self) -> bool {
        matches!(self, Mode::Default)
    }

    /// Name of the mode, also used as the provisioning key.
    pub const fn name(&self) -> &'static str {
        match self {
            Mode::Default => "default",
            Mode::Exam => "exam",
            Mode::Simulation => "simulation",
            Mode::ExamSimulation => "exam_and_simulation",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Mode::Default),
            "exam" => Ok(Mode::Exam),
            "simulation" => Ok(Mode::Simulation),
            "exam_and_simulation" => Ok(Mode::ExamSimulation),
            _ => Err(ParseError::InvalidMode(s.to_string())),
        }
    }
}

/// Slice a packet belongs to, decided by its source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Student,
    Researcher,
    /// Neither slice (infrastructure, unknown hosts, non-IP traffic).
    Other,
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrafficClass::Student => write!(f, "student"),
            TrafficClass::Researcher => write!(f, "researcher"),
            TrafficClass::Other => write!(f, "other"),
        }
    }
}
