use std::io;
use std::path::Path;
use tokio::fs::read_to_string;

use dns_wire::hints::deserialise;
use dns_wire::hints::types::Hints;
use dns_wire::protocol::types::RecordType;

use crate::cache::SharedCache;
use crate::util::types::RootServers;

/// Load a root hints file, seeding the cache with its records and
/// building the root server set from the nominated names.
///
/// # Errors
///
/// If the file cannot be read or parsed, or nominates no reachable
/// IPv4 root server.
pub async fn load_root_hints(
    path: &Path,
    cache: &SharedCache,
) -> Result<RootServers, HintsError> {
    let data = read_to_string(path).await?;
    let hints = Hints::deserialise(&data)?;
    root_servers_from_hints(&hints, cache)
}

/// The pure half of `load_root_hints`: cache every hint record, then
/// pull the nominated names' address records back out into the root
/// server set.
pub fn root_servers_from_hints(
    hints: &Hints,
    cache: &SharedCache,
) -> Result<RootServers, HintsError> {
    for record in &hints.records {
        cache.insert(record);
    }

    let mut roots = RootServers::default();
    for name in &hints.root_server_names {
        roots.v4.append(&mut cache.get(name, RecordType::A));
        roots.v6.append(&mut cache.get(name, RecordType::AAAA));
    }

    if roots.v4.is_empty() {
        return Err(HintsError::NoRootServers);
    }

    tracing::debug!(
        v4 = %roots.v4.len(),
        v6 = %roots.v6.len(),
        "loaded root hints"
    );

    Ok(roots)
}

/// An error that can occur when bootstrapping from a hints file.
#[derive(Debug)]
pub enum HintsError {
    Io(io::Error),
    Parse(deserialise::Error),
    /// The file parsed but gave no IPv4 root server addresses, so
    /// resolution could never start.
    NoRootServers,
}

impl From<io::Error> for HintsError {
    fn from(error: io::Error) -> Self {
        HintsError::Io(error)
    }
}

impl From<deserialise::Error> for HintsError {
    fn from(error: deserialise::Error) -> Self {
        HintsError::Parse(error)
    }
}

impl std::fmt::Display for HintsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HintsError::Io(error) => write!(f, "could not read hints: {error}"),
            HintsError::Parse(error) => write!(f, "could not parse hints: {error}"),
            HintsError::NoRootServers => write!(f, "hints gave no IPv4 root server addresses"),
        }
    }
}

impl std::error::Error for HintsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HintsError::Io(error) => Some(error),
            HintsError::Parse(error) => Some(error),
            HintsError::NoRootServers => None,
        }
    }
}
