//! Test fixtures for common slicing scenarios
//!
//! Reference addresses and operator command payloads matching the campus
//! topology: two student hosts, two researcher hosts, four switches.

use std::net::Ipv4Addr;

use slicing_types::{Dpid, Mode};

/// Student host St1
pub const STUDENT_1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
/// Student host St2
pub const STUDENT_2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
/// Researcher host R1
pub const RESEARCHER_1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);
/// Researcher host R2
pub const RESEARCHER_2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);
/// Host in neither slice
pub const OUTSIDER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 99);

/// Reserved transport port of simulation traffic
pub const SIMULATION_PORT: u16 = 5000;

/// The four switches of the reference topology
pub fn campus_switches() -> Vec<Dpid> {
    (1..=4).map(Dpid).collect()
}

/// Operator command payload fixtures
pub mod command_fixtures {
    use super::*;

    /// Well-formed command for a flag pair
    pub fn command(exam: bool, simulation: bool) -> String {
        serde_json::json!({
            "exam": exam.to_string(),
            "simulation": simulation.to_string(),
        })
        .to_string()
    }

    /// Well-formed command for a mode
    pub fn command_for(mode: Mode) -> String {
        let (exam, simulation) = mode.flags();
        command(exam, simulation)
    }

    /// Command with mixed-case flag strings
    pub fn mixed_case_command() -> String {
        r#"{"exam": "TRUE", "simulation": "False"}"#.to_string()
    }

    /// Malformed payloads that must never change the mode
    pub fn malformed_commands() -> Vec<&'static str> {
        vec![
            r#"{"exam": "yes"}"#,
            r#"{"exam": "true"}"#,
            r#"{"simulation": "false"}"#,
            r#"{"exam": true, "simulation": false}"#,
            r#"{"exam": "true", "simulation": "maybe"}"#,
            r#"["true", "false"]"#,
            r#"{"exam": "true", "simulation": "#,
            "exam=true&simulation=false",
            "",
        ]
    }
}
