//! DSCP policy descriptors handed to the downstream consumer
//!
//! A descriptor is the consumer-facing form of an ADD operation. Building
//! one is where malformed rules are caught; a failed build is declined
//! locally and never reaches the consumer.
//!
//! # DSCP field
//!
//! DSCP occupies the upper 6 bits of the IPv4 TOS byte / IPv6 Traffic
//! Class, so valid values are 0-63.
//!
//! # References
//!
//! - RFC 2474: Definition of the Differentiated Services Field

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::types::{ClassifierParams, PortRange, Protocol, RuleId};
use crate::error::DescriptorError;

/// Maximum valid DSCP value (6-bit field)
pub const DSCP_MAX: u8 = 63;

/// Check if a DSCP value fits the 6-bit field
#[must_use]
pub const fn is_valid_dscp(dscp: u8) -> bool {
    dscp <= DSCP_MAX
}

/// A marking rule ready to be applied by the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    /// Rule identifier
    pub rule_id: RuleId,
    /// DSCP value to set on matching packets
    pub dscp: u8,
    /// Source address
    pub src_ip: Option<IpAddr>,
    /// Destination address
    pub dst_ip: Option<IpAddr>,
    /// Source port
    pub src_port: Option<u16>,
    /// Destination ports (a single port is a one-port range)
    pub dst_ports: Option<PortRange>,
    /// Transport protocol
    pub protocol: Protocol,
}

impl PolicyDescriptor {
    /// Build a descriptor from the fields of an ADD operation
    ///
    /// A single destination port takes precedence over a destination
    /// port range when both are present.
    ///
    /// # Errors
    ///
    /// - `InvalidDscp` - DSCP does not fit in 6 bits
    /// - `AddressFamilyMismatch` - source is IPv4 and destination IPv6 or vice versa
    /// - `InvalidPortRange` - destination port range is inverted
    ///
    /// # Example
    ///
    /// ```
    /// use qos_policy_exchange::policy::{ClassifierParams, PolicyDescriptor, Protocol};
    ///
    /// let mut classifier = ClassifierParams::any();
    /// classifier.protocol = Protocol::Udp;
    /// classifier.dst_port = Some(4500);
    ///
    /// let descriptor = PolicyDescriptor::build(1, 46, &classifier).unwrap();
    /// assert_eq!(descriptor.dst_ports.map(|r| r.start), Some(4500));
    /// ```
    pub fn build(
        rule_id: RuleId,
        dscp: u8,
        classifier: &ClassifierParams,
    ) -> Result<Self, DescriptorError> {
        if !is_valid_dscp(dscp) {
            return Err(DescriptorError::InvalidDscp(dscp));
        }

        if let (Some(src), Some(dst)) = (classifier.src_ip, classifier.dst_ip) {
            if src.is_ipv4() != dst.is_ipv4() {
                return Err(DescriptorError::AddressFamilyMismatch);
            }
        }

        let dst_ports = match (classifier.dst_port, classifier.dst_port_range) {
            (Some(port), _) => Some(PortRange::single(port)),
            (None, Some(range)) => Some(PortRange::new(range.start, range.end)?),
            (None, None) => None,
        };

        Ok(Self {
            rule_id,
            dscp,
            src_ip: classifier.src_ip,
            dst_ip: classifier.dst_ip,
            src_port: classifier.src_port,
            dst_ports,
            protocol: classifier.protocol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dscp_range() {
        for dscp in 0..=DSCP_MAX {
            assert!(is_valid_dscp(dscp), "DSCP {} should be valid", dscp);
        }
        assert!(!is_valid_dscp(64));
        assert!(!is_valid_dscp(255));
    }

    #[test]
    fn test_build_minimal() {
        let descriptor = PolicyDescriptor::build(2, 0, &ClassifierParams::any()).unwrap();
        assert_eq!(descriptor.rule_id, 2);
        assert_eq!(descriptor.dscp, 0);
        assert!(descriptor.dst_ports.is_none());
        assert_eq!(descriptor.protocol, Protocol::Any);
    }

    #[test]
    fn test_build_rejects_wide_dscp() {
        let result = PolicyDescriptor::build(1, 64, &ClassifierParams::any());
        assert_eq!(result, Err(DescriptorError::InvalidDscp(64)));
    }

    #[test]
    fn test_build_rejects_mixed_families() {
        let classifier = ClassifierParams {
            src_ip: Some("10.0.0.1".parse().unwrap()),
            dst_ip: Some("2001:db8::1".parse().unwrap()),
            ..ClassifierParams::any()
        };
        let result = PolicyDescriptor::build(1, 10, &classifier);
        assert_eq!(result, Err(DescriptorError::AddressFamilyMismatch));
    }

    #[test]
    fn test_build_rejects_inverted_range() {
        let classifier = ClassifierParams {
            dst_port_range: Some(PortRange { start: 9000, end: 8000 }),
            ..ClassifierParams::any()
        };
        let result = PolicyDescriptor::build(1, 10, &classifier);
        assert_eq!(
            result,
            Err(DescriptorError::InvalidPortRange {
                start: 9000,
                end: 8000
            })
        );
    }

    #[test]
    fn test_single_port_wins_over_range() {
        let classifier = ClassifierParams {
            dst_port: Some(443),
            dst_port_range: Some(PortRange { start: 9000, end: 8000 }),
            protocol: Protocol::Tcp,
            ..ClassifierParams::any()
        };
        let descriptor = PolicyDescriptor::build(1, 34, &classifier).unwrap();
        assert_eq!(descriptor.dst_ports, Some(PortRange::single(443)));
        assert_eq!(descriptor.protocol.number(), 6);
    }
}
