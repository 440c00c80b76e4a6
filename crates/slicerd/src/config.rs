//! Configuration file support for slicerd
//!
//! Loads and validates the controller configuration from a TOML file.
//! Default location: /etc/slicerd/slicerd.toml
//!
//! Every value is optional; omitted values fall back to the reference
//! campus deployment (four switches, two students, two researchers,
//! command channel on port 9999).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use slicing_common::{QueueShare, SliceError, SliceResult};
use slicing_types::{Dpid, PortNo, QueueId};

use crate::tables::SliceTable;
use crate::types::SliceMembership;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/slicerd/slicerd.toml";

/// Operator command channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Listen address of the command channel
    #[serde(default = "default_command_listen")]
    pub listen: SocketAddr,

    /// Maximum number of connections handled concurrently
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum size of one command in bytes
    #[serde(default = "default_max_command_bytes")]
    pub max_command_bytes: usize,

    /// Read timeout per connection in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Reply with a one-line status before closing (off: fire-and-forget)
    #[serde(default)]
    pub acknowledge: bool,
}

/// Switch event bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Accept switch events from an external switch-control shim
    #[serde(default = "default_events_enabled")]
    pub enabled: bool,

    /// Listen address of the event bridge
    #[serde(default = "default_events_listen")]
    pub listen: SocketAddr,
}

/// Slicing rules configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicingConfig {
    /// Shared forwarding table
    #[serde(default = "SliceTable::reference_default")]
    pub default_table: SliceTable,

    /// Researcher path used by simulation traffic
    #[serde(default = "SliceTable::reference_alternate")]
    pub alternate_table: SliceTable,

    /// Student host addresses
    #[serde(default = "default_student_addresses")]
    pub student_addresses: Vec<Ipv4Addr>,

    /// Researcher host addresses
    #[serde(default = "default_researcher_addresses")]
    pub researcher_addresses: Vec<Ipv4Addr>,

    /// TCP destination port reserved for simulation traffic
    #[serde(default = "default_simulation_port")]
    pub simulation_port: u16,

    /// Queue for researcher traffic on the shared path
    #[serde(default = "default_researcher_queue")]
    pub researcher_queue: QueueId,

    /// Queue for student traffic on the shared path
    #[serde(default = "default_student_queue")]
    pub student_queue: QueueId,

    /// Bandwidth share of the researcher queue
    #[serde(default = "default_researcher_share")]
    pub researcher_share: QueueShare,

    /// Bandwidth share of the student queue
    #[serde(default = "default_student_share")]
    pub student_share: QueueShare,

    /// Edge switches and the ports carrying QoS queues
    #[serde(default = "default_edge_switches")]
    pub edge_switches: BTreeMap<Dpid, Vec<PortNo>>,
}

/// Flow installer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerBackend {
    /// Open vSwitch command line tools
    Ovs,
    /// Log every call, touch nothing
    Log,
}

/// How a mode's ruleset is applied after the switches were cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningKind {
    /// Table-miss rule plus queues, installed by the controller
    Builtin,
    /// One scenario script per mode, run from `scripts_dir`
    Scripts,
}

/// Flow installer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default = "default_backend")]
    pub backend: InstallerBackend,

    /// Bridge name prefix: switch 1 is bridge `s1`, port 2 is `s1-eth2`
    #[serde(default = "default_bridge_prefix")]
    pub bridge_prefix: String,

    /// Prefix switch commands with sudo
    #[serde(default)]
    pub use_sudo: bool,

    /// Bound on every installer call in milliseconds
    #[serde(default = "default_installer_timeout")]
    pub timeout_ms: u64,

    /// Link rate used as the QoS ceiling, bits per second
    #[serde(default = "default_link_rate")]
    pub link_rate_bps: u64,

    #[serde(default = "default_provisioning")]
    pub provisioning: ProvisioningKind,

    /// Directory of the per-mode scenario scripts
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// Clear flows and queues on every known switch at startup
    #[serde(default = "default_reset_on_startup")]
    pub reset_on_startup: bool,
}

/// Complete slicerd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlicerConfig {
    #[serde(default)]
    pub command: CommandConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub slicing: SlicingConfig,

    #[serde(default)]
    pub installer: InstallerConfig,
}

// Default functions
fn default_command_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9999))
}

fn default_max_connections() -> usize {
    64
}

fn default_max_command_bytes() -> usize {
    1024
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_events_enabled() -> bool {
    true
}

fn default_events_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9998))
}

fn default_student_addresses() -> Vec<Ipv4Addr> {
    vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
}

fn default_researcher_addresses() -> Vec<Ipv4Addr> {
    vec![Ipv4Addr::new(10, 0, 0, 3), Ipv4Addr::new(10, 0, 0, 4)]
}

fn default_simulation_port() -> u16 {
    5000
}

fn default_researcher_queue() -> QueueId {
    QueueId(1)
}

fn default_student_queue() -> QueueId {
    QueueId(2)
}

fn default_researcher_share() -> QueueShare {
    QueueShare {
        min_rate_bps: 5_000_000,
        max_rate_bps: 10_000_000,
    }
}

fn default_student_share() -> QueueShare {
    QueueShare {
        min_rate_bps: 1_000_000,
        max_rate_bps: 5_000_000,
    }
}

fn default_edge_switches() -> BTreeMap<Dpid, Vec<PortNo>> {
    BTreeMap::from([
        (Dpid(1), vec![PortNo(1), PortNo(2)]),
        (Dpid(4), vec![PortNo(1), PortNo(2)]),
    ])
}

fn default_backend() -> InstallerBackend {
    InstallerBackend::Ovs
}

fn default_bridge_prefix() -> String {
    "s".to_string()
}

fn default_installer_timeout() -> u64 {
    2000
}

fn default_link_rate() -> u64 {
    10_000_000
}

fn default_provisioning() -> ProvisioningKind {
    ProvisioningKind::Builtin
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scenarios")
}

fn default_reset_on_startup() -> bool {
    true
}

// Default implementations
impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            listen: default_command_listen(),
            max_connections: default_max_connections(),
            max_command_bytes: default_max_command_bytes(),
            read_timeout_ms: default_read_timeout(),
            acknowledge: false,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: default_events_enabled(),
            listen: default_events_listen(),
        }
    }
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            default_table: SliceTable::reference_default(),
            alternate_table: SliceTable::reference_alternate(),
            student_addresses: default_student_addresses(),
            researcher_addresses: default_researcher_addresses(),
            simulation_port: default_simulation_port(),
            researcher_queue: default_researcher_queue(),
            student_queue: default_student_queue(),
            researcher_share: default_researcher_share(),
            student_share: default_student_share(),
            edge_switches: default_edge_switches(),
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bridge_prefix: default_bridge_prefix(),
            use_sudo: false,
            timeout_ms: default_installer_timeout(),
            link_rate_bps: default_link_rate(),
            provisioning: default_provisioning(),
            scripts_dir: default_scripts_dir(),
            reset_on_startup: default_reset_on_startup(),
        }
    }
}

impl SlicingConfig {
    /// Student and researcher sets
    pub fn membership(&self) -> SliceMembership {
        SliceMembership::new(
            self.student_addresses.iter().copied(),
            self.researcher_addresses.iter().copied(),
        )
    }

    /// Every switch named by either table or the edge list
    pub fn known_switches(&self) -> BTreeSet<Dpid> {
        self.default_table
            .switches()
            .chain(self.alternate_table.switches())
            .chain(self.edge_switches.keys().copied())
            .collect()
    }
}

impl SlicerConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> SliceResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| {
                SliceError::invalid_config(path.display().to_string(), e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(SliceError::Io(e)),
        }
    }

    /// Load configuration from file; a missing file is an error
    pub fn load(path: impl AsRef<Path>) -> SliceResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| SliceError::invalid_config(path.display().to_string(), e.to_string()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> SliceResult<Self> {
        toml::from_str(content).map_err(|e| SliceError::invalid_config("toml", e.to_string()))
    }

    /// Get read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.command.read_timeout_ms)
    }

    /// Get installer call timeout as Duration
    pub fn installer_timeout(&self) -> Duration {
        Duration::from_millis(self.installer.timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> SliceResult<()> {
        let slicing = &self.slicing;

        slicing.default_table.validate_symmetric("default_table")?;
        slicing.alternate_table.validate_symmetric("alternate_table")?;

        if slicing.default_table.is_empty() {
            return Err(SliceError::invalid_config(
                "default_table",
                "must contain at least one switch",
            ));
        }

        let students: BTreeSet<_> = slicing.student_addresses.iter().collect();
        if let Some(addr) = slicing
            .researcher_addresses
            .iter()
            .find(|addr| students.contains(addr))
        {
            return Err(SliceError::invalid_config(
                "researcher_addresses",
                format!("{} is also a student address", addr),
            ));
        }

        if slicing.researcher_queue == slicing.student_queue {
            return Err(SliceError::invalid_config(
                "student_queue",
                "must differ from researcher_queue",
            ));
        }

        for (field, share) in [
            ("researcher_share", slicing.researcher_share),
            ("student_share", slicing.student_share),
        ] {
            if share.min_rate_bps > share.max_rate_bps {
                return Err(SliceError::invalid_config(
                    field,
                    "min_rate_bps must not exceed max_rate_bps",
                ));
            }
        }

        if slicing.simulation_port == 0 {
            return Err(SliceError::invalid_config("simulation_port", "must be > 0"));
        }

        if self.command.max_connections == 0 {
            return Err(SliceError::invalid_config("max_connections", "must be > 0"));
        }

        if self.command.max_command_bytes == 0 {
            return Err(SliceError::invalid_config("max_command_bytes", "must be > 0"));
        }

        if self.installer.timeout_ms == 0 {
            return Err(SliceError::invalid_config("timeout_ms", "must be > 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SlicerConfig::default();
        assert_eq!(config.command.listen.port(), 9999);
        assert!(!config.command.acknowledge);
        assert_eq!(config.slicing.simulation_port, 5000);
        assert_eq!(config.slicing.researcher_queue, QueueId(1));
        assert_eq!(config.slicing.student_queue, QueueId(2));
        assert_eq!(config.installer.backend, InstallerBackend::Ovs);
        assert_eq!(config.installer.provisioning, ProvisioningKind::Builtin);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(SlicerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlapping_membership() {
        let mut config = SlicerConfig::default();
        config
            .slicing
            .researcher_addresses
            .push(Ipv4Addr::new(10, 0, 0, 1));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn test_validate_asymmetric_table() {
        let mut config = SlicerConfig::default();
        config.slicing.alternate_table = SliceTable::from_pairs(&[(3, &[(1, 2)])]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_same_queues() {
        let mut config = SlicerConfig::default();
        config.slicing.student_queue = config.slicing.researcher_queue;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_known_switches() {
        let config = SlicerConfig::default();
        let switches: Vec<Dpid> = config.slicing.known_switches().into_iter().collect();
        assert_eq!(switches, vec![Dpid(1), Dpid(2), Dpid(3), Dpid(4)]);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[command]
listen = "127.0.0.1:10999"
acknowledge = true

[slicing]
simulation_port = 6000
student_addresses = ["10.0.1.1"]
edge_switches = { 1 = [3, 4] }

[slicing.default_table.2]
1 = 2
2 = 1

[installer]
backend = "log"
provisioning = "scripts"
scripts_dir = "/opt/slicerd/scenarios"
"#;
        let config = SlicerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.command.listen.port(), 10999);
        assert!(config.command.acknowledge);
        assert_eq!(config.slicing.simulation_port, 6000);
        assert_eq!(config.slicing.student_addresses, vec![Ipv4Addr::new(10, 0, 1, 1)]);
        assert_eq!(
            config.slicing.edge_switches[&Dpid(1)],
            vec![PortNo(3), PortNo(4)]
        );
        assert_eq!(
            config.slicing.default_table.lookup(Dpid(2), PortNo(1)),
            Some(PortNo(2))
        );
        assert_eq!(config.installer.backend, InstallerBackend::Log);
        assert_eq!(config.installer.provisioning, ProvisioningKind::Scripts);
        // Unspecified values should use defaults
        assert_eq!(config.slicing.researcher_addresses.len(), 2);
        assert_eq!(config.command.max_command_bytes, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let sample = SlicerConfig::from_toml_str(include_str!("../slicerd.toml")).unwrap();
        let defaults = SlicerConfig::default();
        sample.validate().unwrap();
        assert_eq!(sample.slicing.default_table, defaults.slicing.default_table);
        assert_eq!(sample.slicing.alternate_table, defaults.slicing.alternate_table);
        assert_eq!(sample.slicing.edge_switches, defaults.slicing.edge_switches);
        assert_eq!(sample.slicing.student_share, defaults.slicing.student_share);
        assert_eq!(sample.command.listen, defaults.command.listen);
        assert_eq!(sample.installer.timeout_ms, defaults.installer.timeout_ms);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("slicerd.toml");
        fs::write(&path, "[installer]\ntimeout_ms = 250\n").unwrap();

        let config = SlicerConfig::load(&path).unwrap();
        assert_eq!(config.installer_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[command\nlisten = 1").unwrap();

        let err = SlicerConfig::load(&path).unwrap_err();
        assert!(matches!(err, SliceError::InvalidConfig { .. }));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SlicerConfig::load_or_default("/nonexistent/slicerd.toml").unwrap();
        assert_eq!(config.command.listen.port(), 9999);
    }
}
