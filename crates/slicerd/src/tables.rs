//! Slice tables: static per-switch port mappings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use slicing_common::{SliceError, SliceResult};
use slicing_types::{Dpid, PortNo};

/// Per-switch `in_port -> out_port` mapping.
///
/// Fixed at startup and read-only afterwards. Every entry is one half of a
/// bidirectional port pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliceTable {
    switches: BTreeMap<Dpid, BTreeMap<PortNo, PortNo>>,
}

impl SliceTable {
    /// Builds a table from raw `(dpid, [(in, out)])` pairs.
    pub fn from_pairs(entries: &[(u64, &[(u32, u32)])]) -> Self {
        let switches = entries
            .iter()
            .map(|(dpid, ports)| {
                let ports = ports
                    .iter()
                    .map(|(input, output)| (PortNo(*input), PortNo(*output)))
                    .collect();
                (Dpid(*dpid), ports)
            })
            .collect();
        Self { switches }
    }

    /// Shared path used by default for every class: s1 - s2 - s4 for one pair
    /// of ports, s1 - s3 - s4 for the other.
    pub fn reference_default() -> Self {
        Self::from_pairs(&[
            (1, &[(1, 3), (3, 1), (2, 4), (4, 2)]),
            (4, &[(1, 3), (3, 1), (2, 4), (4, 2)]),
            (2, &[(1, 2), (2, 1)]),
            (3, &[(1, 2), (2, 1)]),
        ])
    }

    /// Alternate researcher path through switch 3, used for simulation traffic.
    pub fn reference_alternate() -> Self {
        Self::from_pairs(&[
            (1, &[(2, 4), (4, 2)]),
            (3, &[(1, 2), (2, 1)]),
            (4, &[(2, 4), (4, 2)]),
        ])
    }

    /// Output port for a packet entering `dpid` on `in_port`.
    pub fn lookup(&self, dpid: Dpid, in_port: PortNo) -> Option<PortNo> {
        self.switches.get(&dpid)?.get(&in_port).copied()
    }

    /// Returns true if the table has entries for `dpid`.
    pub fn contains_switch(&self, dpid: Dpid) -> bool {
        self.switches.contains_key(&dpid)
    }

    /// Switches with at least one entry.
    pub fn switches(&self) -> impl Iterator<Item = Dpid> + '_ {
        self.switches.keys().copied()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.switches.values().all(BTreeMap::is_empty)
    }

    /// Checks that every `in -> out` entry has its `out -> in` counterpart.
    ///
    /// `name` identifies the table in the error.
    pub fn validate_symmetric(&self, name: &str) -> SliceResult<()> {
        for (dpid, ports) in &self.switches {
            for (input, output) in ports {
                if ports.get(output) != Some(input) {
                    return Err(SliceError::invalid_config(
                        name,
                        format!(
                            "switch {} maps port {} -> {} but not {} -> {}",
                            dpid, input, output, output, input
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reference_default_lookups() {
        let table = SliceTable::reference_default();
        assert_eq!(table.lookup(Dpid(1), PortNo(1)), Some(PortNo(3)));
        assert_eq!(table.lookup(Dpid(2), PortNo(1)), Some(PortNo(2)));
        assert_eq!(table.lookup(Dpid(4), PortNo(4)), Some(PortNo(2)));
        assert_eq!(table.lookup(Dpid(2), PortNo(3)), None);
        assert_eq!(table.lookup(Dpid(9), PortNo(1)), None);
    }

    #[test]
    fn test_reference_tables_are_symmetric() {
        SliceTable::reference_default()
            .validate_symmetric("default_table")
            .unwrap();
        SliceTable::reference_alternate()
            .validate_symmetric("alternate_table")
            .unwrap();
    }

    #[test]
    fn test_asymmetric_table_rejected() {
        let table = SliceTable::from_pairs(&[(1, &[(1, 3), (3, 2)])]);
        let err = table.validate_symmetric("default_table").unwrap_err();
        assert!(err.to_string().contains("default_table"));
        assert!(err.to_string().contains("1 -> 3"));
    }

    #[test]
    fn test_switch_listing() {
        let table = SliceTable::reference_alternate();
        let switches: Vec<Dpid> = table.switches().collect();
        assert_eq!(switches, vec![Dpid(1), Dpid(3), Dpid(4)]);
        assert!(table.contains_switch(Dpid(3)));
        assert!(!table.contains_switch(Dpid(2)));
        assert!(SliceTable::default().is_empty());
    }

    #[test]
    fn test_deserialize_from_json() {
        let table: SliceTable = serde_json::from_str(r#"{"2": {"1": 2, "2": 1}}"#).unwrap();
        assert_eq!(table, SliceTable::from_pairs(&[(2, &[(1, 2), (2, 1)])]));
    }
}
