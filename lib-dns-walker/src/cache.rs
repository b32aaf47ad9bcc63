use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dns_wire::protocol::types::*;

/// A convenience wrapper around a `Cache` which lets it be shared
/// between tasks.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.
#[derive(Debug, Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

impl SharedCache {
    /// Make a new, empty, shared cache.
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::new())),
        }
    }

    /// Get the still-live records for a (name, type) pair.  Expired
    /// records are skipped, not returned with a zeroed TTL.
    pub fn get(&self, name: &DomainName, qtype: RecordType) -> Vec<ResourceRecord> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get(name, qtype)
    }

    /// Insert an entry into the cache.
    ///
    /// It is not inserted if its TTL is zero.
    pub fn insert(&self, record: &ResourceRecord) {
        if record.ttl > 0 {
            self.cache
                .lock()
                .expect(MUTEX_POISON_MESSAGE)
                .insert(record);
        }
    }

    /// Insert a whole response section.
    pub fn insert_all(&self, records: &[ResourceRecord]) {
        let mut cache = self.cache.lock().expect(MUTEX_POISON_MESSAGE);
        for record in records {
            if record.ttl > 0 {
                cache.insert(record);
            }
        }
    }

    /// Find the NS records cached for the longest suffix of `name`.
    pub fn nearest_ns(&self, name: &DomainName) -> Option<Vec<ResourceRecord>> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .nearest_ns(name)
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Caching for `ResourceRecord`s, keyed by the sanitised name and
/// then by record type.
///
/// The cache is purely additive: nothing is ever evicted.  Expiry is
/// enforced at read time instead, against the instant each record was
/// inserted.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    entries: HashMap<DomainName, HashMap<RecordType, Vec<CachedRecord>>>,
}

/// A cached record: the data plus the moment it entered the process.
/// Insertion time takes no part in record equality.
#[derive(Debug, Clone)]
struct CachedRecord {
    rtype_with_data: RecordTypeWithData,
    ttl: u32,
    inserted_at: Instant,
}

impl CachedRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at).as_secs() >= u64::from(self.ttl)
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the still-live records for a (name, type) pair, with their
    /// original TTLs.
    pub fn get(&self, name: &DomainName, qtype: RecordType) -> Vec<ResourceRecord> {
        self.get_at(name, qtype, Instant::now())
    }

    fn get_at(&self, name: &DomainName, qtype: RecordType, now: Instant) -> Vec<ResourceRecord> {
        let Some(entry) = self.entries.get(name) else {
            return Vec::new();
        };
        let Some(cached) = entry.get(&qtype) else {
            return Vec::new();
        };

        cached
            .iter()
            .filter(|c| !c.is_expired(now))
            .map(|c| ResourceRecord {
                name: name.clone(),
                rtype_with_data: c.rtype_with_data.clone(),
                rclass: RecordClass::IN,
                ttl: c.ttl,
            })
            .collect()
    }

    /// Insert an entry into the cache.  Inserting a record which is
    /// structurally equal to one already present (same name, type,
    /// ttl, and rdata) refreshes its insertion time rather than
    /// appending a duplicate.
    pub fn insert(&mut self, record: &ResourceRecord) {
        let rtype = record.rtype_with_data.rtype();
        let now = Instant::now();

        let cached = self
            .entries
            .entry(record.name.clone())
            .or_default()
            .entry(rtype)
            .or_default();

        for existing in cached.iter_mut() {
            if existing.rtype_with_data == record.rtype_with_data && existing.ttl == record.ttl {
                existing.inserted_at = now;
                return;
            }
        }

        cached.push(CachedRecord {
            rtype_with_data: record.rtype_with_data.clone(),
            ttl: record.ttl,
            inserted_at: now,
        });
    }

    /// Find the NS records cached under the longest suffix of `name`,
    /// walking from the full name up to and including the root.
    pub fn nearest_ns(&self, name: &DomainName) -> Option<Vec<ResourceRecord>> {
        self.nearest_ns_at(name, Instant::now())
    }

    fn nearest_ns_at(&self, name: &DomainName, now: Instant) -> Option<Vec<ResourceRecord>> {
        for i in 0..name.labels.len() {
            if let Some(suffix) = DomainName::from_labels(name.labels[i..].into()) {
                let rrs = self.get_at(&suffix, RecordType::NS, now);
                if !rrs.is_empty() {
                    return Some(rrs);
                }
            }
        }

        None
    }
}
