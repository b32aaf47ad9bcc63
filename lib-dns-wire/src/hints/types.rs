use crate::protocol::types::{DomainName, ResourceRecord};

/// The parsed contents of a root hints file, eg `named.root`.
///
/// The file is a flat list of master-file-style records seeding the
/// resolver: address records for the root name servers, plus NS
/// records nominating which names are root servers at all.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Hints {
    /// Every well-formed record in the file, in file order.
    pub records: Vec<ResourceRecord>,

    /// The nsdname of every NS record, in file order: these are the
    /// names whose addresses form the root server set.
    pub root_server_names: Vec<DomainName>,
}
