//! Reverse lookups: turning an address literal into the PTR query
//! name that encodes it, and resolving that name.

use std::net::{Ipv4Addr, Ipv6Addr};

use dns_wire::protocol::types::{Message, RecordType};

use crate::iterative::Resolver;
use crate::util::types::ResolutionError;

/// The PTR query name for an IPv4 address: the octets reversed, under
/// `in-addr.arpa.`.
pub fn ptr_qname_v4(address: Ipv4Addr) -> String {
    let [a, b, c, d] = address.octets();
    format!("{d}.{c}.{b}.{a}.in-addr.arpa.")
}

/// The PTR query name for an IPv6 address: all 32 nibbles of the
/// expanded form, reversed and dot-separated, under `ip6.arpa.`.
pub fn ptr_qname_v6(address: Ipv6Addr) -> String {
    let nibbles = format!("{:032x}", u128::from(address));

    let mut out = String::with_capacity(nibbles.len() * 2 + "ip6.arpa.".len());
    for nibble in nibbles.chars().rev() {
        out.push(nibble);
        out.push('.');
    }
    out.push_str("ip6.arpa.");
    out
}

impl Resolver {
    /// Reverse lookup of an IPv4 address literal.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` if the literal does not parse; otherwise as
    /// `recursive_query`.
    pub async fn reverse_lookup_v4(&self, address: &str) -> Result<Message, ResolutionError> {
        let parsed: Ipv4Addr = address
            .parse()
            .map_err(|_| ResolutionError::InvalidAddress {
                address: address.into(),
            })?;

        self.recursive_query(&ptr_qname_v4(parsed), RecordType::PTR)
            .await
    }

    /// Reverse lookup of an IPv6 address literal (compressed or
    /// expanded form).
    ///
    /// # Errors
    ///
    /// `InvalidAddress` if the literal does not parse; otherwise as
    /// `recursive_query`.
    pub async fn reverse_lookup_v6(&self, address: &str) -> Result<Message, ResolutionError> {
        let parsed: Ipv6Addr = address
            .parse()
            .map_err(|_| ResolutionError::InvalidAddress {
                address: address.into(),
            })?;

        self.recursive_query(&ptr_qname_v6(parsed), RecordType::PTR)
            .await
    }
}
