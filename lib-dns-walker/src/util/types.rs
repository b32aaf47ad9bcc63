use std::net::Ipv4Addr;

use dns_wire::protocol::types::*;

/// Which address family a root server record belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

/// The seed servers for iterative resolution, loaded once from the
/// hints file at startup and read-only thereafter.
///
/// The V4 list holds A records, the V6 list AAAA records, both owned
/// by root server names.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct RootServers {
    pub v4: Vec<ResourceRecord>,
    pub v6: Vec<ResourceRecord>,
}

impl RootServers {
    pub fn get(&self, version: IpVersion) -> &[ResourceRecord] {
        match version {
            IpVersion::V4 => &self.v4,
            IpVersion::V6 => &self.v6,
        }
    }

    /// The IPv4 addresses resolution starts from when nothing closer
    /// is cached.
    pub fn v4_addresses(&self) -> Vec<Ipv4Addr> {
        let mut addresses = Vec::with_capacity(self.v4.len());
        for rr in &self.v4 {
            if let RecordTypeWithData::A { address } = rr.rtype_with_data {
                addresses.push(address);
            }
        }
        addresses
    }
}

/// An error that can occur when trying to resolve a name.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ResolutionError {
    /// The name to resolve is empty or cannot be a domain name.
    InvalidName { name: String },
    /// The address literal of a reverse lookup cannot be parsed.
    InvalidAddress { address: String },
    /// Every candidate server timed out or answered garbage.
    Timeout,
    /// Hit the recursion limit while chasing referrals or nameserver
    /// addresses.
    RecursionLimit,
    /// Ran out of candidate servers without an answer.
    DeadEnd { question: Question },
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResolutionError::InvalidName { name } => write!(f, "invalid name '{name}'"),
            ResolutionError::InvalidAddress { address } => {
                write!(f, "invalid address '{address}'")
            }
            ResolutionError::Timeout => write!(f, "no server answered"),
            ResolutionError::RecursionLimit => write!(f, "referral chain too long"),
            ResolutionError::DeadEnd { question } => {
                write!(f, "unable to answer '{question}'")
            }
        }
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
