//! Common types for the campus slicing controller.
//!
//! This crate provides type-safe representations of the primitives shared
//! by the slicing daemon, its installer backends and its tests:
//!
//! - [`Dpid`]: OpenFlow datapath identifiers
//! - [`PortNo`]: switch port numbers
//! - [`QueueId`]: QoS queue identifiers
//! - [`Mode`]: the four operating modes (exam / simulation flag pairs)
//! - [`TrafficClass`]: which slice a source address belongs to

mod mode;
mod switch;

pub use mode::{Mode, TrafficClass};
pub use switch::{Dpid, PortNo, QueueId};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid datapath id: {0}")]
    InvalidDpid(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid queue id: {0}")]
    InvalidQueue(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid boolean flag: {0} (expected \"true\" or \"false\")")]
    InvalidFlag(String),
}

/// Parses an operator flag the way the command channel accepts it:
/// exactly `"true"` or `"false"`, case-insensitive.
pub fn parse_flag(s: &str) -> Result<bool, ParseError> {
    if s.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if s.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ParseError::InvalidFlag(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("FALSE"), Ok(false));
        assert_eq!(parse_flag("True"), Ok(true));
        assert!(parse_flag(" True ").is_err());
        assert!(parse_flag("false\n").is_err());
        assert!(parse_flag("yes").is_err());
        assert!(parse_flag("").is_err());
    }
}
