//! Datagram protocol numbers

use crate::{Result, SocketError};

/// User application data
pub const DATA: i32 = 0;
/// Ranging agents
pub const RANGING: i32 = 1;
/// Link agents
pub const LINK: i32 = 2;
/// Remote management agents
pub const REMOTE: i32 = 3;
/// MAC protocol agents
pub const MAC: i32 = 4;
/// Routing agents
pub const ROUTING: i32 = 5;
/// Transport agents
pub const TRANSPORT: i32 = 6;
/// Route maintenance agents
pub const ROUTE_MAINTENANCE: i32 = 7;
/// Secondary link agents
pub const LINK2: i32 = 8;
/// Lowest protocol number available to applications
pub const USER: i32 = 32;
/// Highest protocol number
pub const MAX: i32 = 63;

/// Accept DATA or a user protocol
pub fn check_application(protocol: i32) -> Result<i32> {
    if protocol == DATA || (USER..=MAX).contains(&protocol) {
        Ok(protocol)
    } else {
        Err(SocketError::invalid_protocol(protocol))
    }
}

/// Whether a received datagram carries application traffic
pub fn is_application(protocol: i64) -> bool {
    protocol == DATA as i64 || protocol >= USER as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_protocols() {
        assert!(check_application(DATA).is_ok());
        assert!(check_application(USER).is_ok());
        assert!(check_application(MAX).is_ok());
        assert!(check_application(ROUTING).is_err());
        assert!(check_application(MAX + 1).is_err());
        assert!(check_application(-1).is_err());
    }

    #[test]
    fn test_received_protocol_filter() {
        assert!(is_application(0));
        assert!(is_application(40));
        assert!(!is_application(LINK as i64));
    }
}
