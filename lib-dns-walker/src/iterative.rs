use async_recursion::async_recursion;
use rand::Rng;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use dns_wire::protocol::types::*;

use crate::cache::SharedCache;
use crate::util::types::{ResolutionError, RootServers};

/// The well-known DNS port queries are sent to.
pub const DNS_PORT: u16 = 53;

/// How long to wait for each candidate server before moving on to the
/// next one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum recursion depth.  Bounds both referral hops and the nested
/// resolutions needed to find nameserver addresses, so a
/// maliciously-deep (or circular) delegation cannot descend forever.
pub const RECURSION_LIMIT: usize = 32;

/// Datagrams longer than this are not expected: the resolver neither
/// speaks EDNS(0) nor falls back to TCP.
const RECV_BUFFER_SIZE: usize = 1024;

/// An iterative resolver: walks the DNS hierarchy from the root
/// servers, following referrals and caching everything it learns
/// along the way.
#[derive(Debug, Clone)]
pub struct Resolver {
    cache: SharedCache,
    roots: RootServers,
    upstream_port: u16,
    timeout: Duration,
}

impl Resolver {
    pub fn new(roots: RootServers, cache: SharedCache) -> Self {
        Self {
            cache,
            roots,
            upstream_port: DNS_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Send queries to this port instead of port 53.
    pub fn with_upstream_port(mut self, port: u16) -> Self {
        self.upstream_port = port;
        self
    }

    /// Wait this long for each candidate server.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Resolve a name by walking the hierarchy: answer from cache if
    /// possible, otherwise start from the closest cached NS set (or
    /// the roots) and follow referrals until some server gives an
    /// answer, an error rcode, or nothing more to try.
    ///
    /// # Errors
    ///
    /// See `ResolutionError`.  A response with a non-`NOERROR` rcode
    /// is not an error here: authoritative negatives are returned
    /// verbatim.
    pub async fn recursive_query(
        &self,
        name: &str,
        qtype: RecordType,
    ) -> Result<Message, ResolutionError> {
        let Some(qname) = DomainName::sanitise(name) else {
            return Err(ResolutionError::InvalidName { name: name.into() });
        };

        self.recursive_query_limited(&qname, qtype, RECURSION_LIMIT)
            .await
    }

    #[async_recursion]
    async fn recursive_query_limited(
        &self,
        qname: &DomainName,
        qtype: RecordType,
        limit: usize,
    ) -> Result<Message, ResolutionError> {
        if limit == 0 {
            tracing::debug!(%qname, "hit recursion limit");
            return Err(ResolutionError::RecursionLimit);
        }

        let question = Question {
            name: qname.clone(),
            qtype,
            qclass: RecordClass::IN,
        };

        let cached = self.cache.get(qname, qtype);
        if !cached.is_empty() {
            tracing::trace!(%question, hits = %cached.len(), "answered from cache");
            let mut response =
                Message::from_question(rand::thread_rng().gen(), question).make_response();
            response.answers = cached;
            return Ok(response);
        }

        let mut servers = match self.cache.nearest_ns(qname) {
            Some(ns_rrs) => {
                let names = nameserver_names(&ns_rrs);
                self.nameserver_addresses(&names, limit - 1).await
            }
            None => self.roots.v4_addresses(),
        };

        let mut limit = limit;
        while !servers.is_empty() {
            let Some(response) = self.send_query(qname, qtype, &servers, false).await else {
                return Err(ResolutionError::Timeout);
            };

            if response.header.rcode != Rcode::NoError {
                tracing::debug!(%question, rcode = %response.header.rcode, "upstream error returned verbatim");
                return Ok(response);
            }

            self.cache.insert_all(&response.answers);
            self.cache.insert_all(&response.authority);
            self.cache.insert_all(&response.additional);

            if !response.answers.is_empty() {
                return Ok(response);
            }

            // a referral: the servers named in the authority and
            // additional sections are closer to the answer than we
            // are
            let referred = referral_names(&response.authority, &response.additional);
            if referred.is_empty() {
                break;
            }

            limit -= 1;
            if limit == 0 {
                tracing::debug!(%question, "hit recursion limit while following referrals");
                return Err(ResolutionError::RecursionLimit);
            }

            tracing::trace!(%question, candidates = %referred.len(), "following referral");
            servers = self.nameserver_addresses(&referred, limit).await;
        }

        tracing::trace!(%question, "out of candidate servers");
        Err(ResolutionError::DeadEnd { question })
    }

    /// Turn a list of nameserver names into IPv4 addresses to query.
    ///
    /// Glue first: any address already in the cache (referrals
    /// usually carry the glue in their additional section) wins, and
    /// no network traffic happens.  Only if no name has a cached
    /// address does this fall back to resolving the names themselves,
    /// stopping at the first name that yields any address - one
    /// reachable nameserver is enough to make progress, and the early
    /// exit bounds the fan-out.
    async fn nameserver_addresses(&self, names: &[DomainName], limit: usize) -> Vec<Ipv4Addr> {
        let mut addresses = Vec::new();

        for name in names {
            for rr in self.cache.get(name, RecordType::A) {
                if let RecordTypeWithData::A { address } = rr.rtype_with_data {
                    addresses.push(address);
                }
            }
        }
        if !addresses.is_empty() {
            return addresses;
        }

        for name in names {
            match self
                .recursive_query_limited(name, RecordType::A, limit)
                .await
            {
                Ok(response) => {
                    for rr in response.answers {
                        if let RecordTypeWithData::A { address } = rr.rtype_with_data {
                            addresses.push(address);
                        }
                    }
                    if !addresses.is_empty() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::debug!(%name, %error, "could not resolve nameserver address");
                }
            }
        }

        addresses
    }

    /// One-shot query: ask each candidate server in turn and return
    /// the first response that matches the request.  Per-server
    /// timeouts silently move on to the next server; `None` means
    /// every server timed out (or answered garbage).
    ///
    /// An empty server list means "ask the roots".
    pub async fn send_query(
        &self,
        qname: &DomainName,
        qtype: RecordType,
        servers: &[Ipv4Addr],
        recursion_desired: bool,
    ) -> Option<Message> {
        let question = Question {
            name: qname.clone(),
            qtype,
            qclass: RecordClass::IN,
        };
        let mut request = Message::from_question(rand::thread_rng().gen(), question);
        request.header.recursion_desired = recursion_desired;

        let serialised = match request.clone().into_octets() {
            Ok(octets) => octets,
            Err(error) => {
                tracing::warn!(message = ?request, ?error, "could not serialise message");
                return None;
            }
        };

        let sock = UdpSocket::bind("0.0.0.0:0").await.ok()?;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        let fallback;
        let servers: &[Ipv4Addr] = if servers.is_empty() {
            fallback = self.roots.v4_addresses();
            &fallback
        } else {
            servers
        };

        for server in servers {
            let target = SocketAddr::new(IpAddr::V4(*server), self.upstream_port);
            tracing::trace!(%target, question = %request.questions[0], "sending query");

            if let Err(error) = sock.send_to(&serialised, target).await {
                tracing::debug!(%target, ?error, "could not send query");
                continue;
            }

            match timeout(self.timeout, sock.recv_from(&mut buf)).await {
                Ok(Ok((received, _))) => match Message::from_octets(&buf[..received]) {
                    Ok(response) if response_matches_request(&request, &response) => {
                        return Some(response);
                    }
                    Ok(_) => {
                        tracing::debug!(%target, "response does not match request, discarded");
                    }
                    Err(error) => {
                        tracing::debug!(%target, ?error, "could not deserialise response");
                    }
                },
                Ok(Err(error)) => {
                    tracing::debug!(%target, ?error, "receive error");
                }
                Err(_) => {
                    tracing::trace!(%target, "timed out, trying next server");
                }
            }
        }

        None
    }
}

/// Collect the nameserver names a referral points at: NS rdata
/// directly, and SOA rdata via its mname.
pub fn referral_names(authority: &[ResourceRecord], additional: &[ResourceRecord]) -> Vec<DomainName> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for rr in authority.iter().chain(additional.iter()) {
        let name = match &rr.rtype_with_data {
            RecordTypeWithData::NS { nsdname } => nsdname,
            RecordTypeWithData::SOA { mname, .. } => mname,
            _ => continue,
        };
        if seen.insert(name.clone()) {
            names.push(name.clone());
        }
    }

    names
}

/// The nsdnames of a set of NS records.
pub fn nameserver_names(ns_rrs: &[ResourceRecord]) -> Vec<DomainName> {
    let mut names = Vec::with_capacity(ns_rrs.len());
    for rr in ns_rrs {
        if let RecordTypeWithData::NS { nsdname } = &rr.rtype_with_data {
            names.push(nsdname.clone());
        }
    }
    names
}

/// Very basic validation that a response matches a request:
///
/// - Check the ID, opcode, and questions match.
///
/// - Check it is a response.
///
/// The rcode is deliberately not checked: upstream errors are
/// surfaced to the caller verbatim.  Neither is the TC flag, which
/// this resolver does not act upon.
fn response_matches_request(request: &Message, response: &Message) -> bool {
    if request.header.id != response.header.id {
        return false;
    }
    if !response.header.is_response {
        return false;
    }
    if request.header.opcode != response.header.opcode {
        return false;
    }
    if request.questions != response.questions {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use dns_wire::protocol::types::test_util::*;
    use std::net::Ipv6Addr;

    use super::*;

    #[test]
    fn referral_names_takes_ns_and_soa_mname() {
        let authority = [
            ns_record("example.com.", "ns1.example.net."),
            soa_record("example.com.", "primary.example.net.", "hostmaster.example.net."),
        ];
        let additional = [
            ns_record("example.com.", "ns2.example.net."),
            a_record("ns1.example.net.", Ipv4Addr::new(192, 0, 2, 1)),
        ];

        assert_eq!(
            vec![
                domain("ns1.example.net."),
                domain("primary.example.net."),
                domain("ns2.example.net."),
            ],
            referral_names(&authority, &additional)
        );
    }

    #[test]
    fn referral_names_deduplicates() {
        let authority = [
            ns_record("example.com.", "ns1.example.net."),
            ns_record("example.com.", "ns1.example.net."),
        ];

        assert_eq!(
            vec![domain("ns1.example.net.")],
            referral_names(&authority, &[])
        );
    }

    #[test]
    fn nameserver_names_skips_non_ns() {
        let rrs = [
            ns_record("example.com.", "ns1.example.net."),
            a_record("ns1.example.net.", Ipv4Addr::new(192, 0, 2, 1)),
        ];

        assert_eq!(vec![domain("ns1.example.net.")], nameserver_names(&rrs));
    }

    #[test]
    fn response_matches_request_accepts() {
        let (request, response) = matching_response();

        assert!(response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_checks_id() {
        let (request, mut response) = matching_response();
        response.header.id = response.header.id.wrapping_add(1);

        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_checks_qr() {
        let (request, mut response) = matching_response();
        response.header.is_response = false;

        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_checks_question() {
        let (request, mut response) = matching_response();
        response.questions[0].qtype = RecordType::AAAA;

        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_ignores_rcode() {
        let (request, mut response) = matching_response();
        response.header.rcode = Rcode::NameError;

        assert!(response_matches_request(&request, &response));
    }

    #[tokio::test]
    async fn recursive_query_rejects_empty_name() {
        let resolver = Resolver::new(RootServers::default(), SharedCache::new());

        assert_eq!(
            Err(ResolutionError::InvalidName { name: "".into() }),
            resolver.recursive_query("", RecordType::A).await
        );
        assert_eq!(
            Err(ResolutionError::InvalidName { name: "...".into() }),
            resolver.recursive_query("...", RecordType::A).await
        );
    }

    #[tokio::test]
    async fn recursive_query_answers_from_cache() {
        let cache = SharedCache::new();
        let rr = a_record("example.com.", Ipv4Addr::new(93, 184, 216, 34));
        cache.insert(&rr);

        // no roots: any network attempt would dead-end immediately
        let resolver = Resolver::new(RootServers::default(), cache);
        let response = resolver
            .recursive_query("Example.COM", RecordType::A)
            .await
            .unwrap();

        assert!(response.header.is_response);
        assert_eq!(vec![rr], response.answers);
        assert_eq!(
            vec![Question {
                name: domain("example.com."),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            }],
            response.questions
        );
    }

    #[tokio::test]
    async fn recursive_query_cache_miss_on_other_type_dead_ends() {
        let cache = SharedCache::new();
        cache.insert(&aaaa_record(
            "example.com.",
            Ipv6Addr::from(0x2001_0db8_0000_0000_0000_0000_0000_0001u128),
        ));

        let resolver = Resolver::new(RootServers::default(), cache);

        assert_eq!(
            Err(ResolutionError::DeadEnd {
                question: Question {
                    name: domain("example.com."),
                    qtype: RecordType::A,
                    qclass: RecordClass::IN,
                }
            }),
            resolver.recursive_query("example.com.", RecordType::A).await
        );
    }

    #[tokio::test]
    async fn nameserver_addresses_prefers_cached_glue() {
        let cache = SharedCache::new();
        cache.insert(&a_record("ns1.example.net.", Ipv4Addr::new(192, 0, 2, 1)));
        cache.insert(&a_record("ns1.example.net.", Ipv4Addr::new(192, 0, 2, 2)));

        let resolver = Resolver::new(RootServers::default(), cache);
        let addresses = resolver
            .nameserver_addresses(
                &[domain("missing.example.net."), domain("ns1.example.net.")],
                RECURSION_LIMIT,
            )
            .await;

        assert_eq!(
            vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)],
            addresses
        );
    }

    #[tokio::test]
    async fn nameserver_addresses_is_bounded() {
        // no glue and no roots: the fallback resolution dead-ends
        // without hitting the network, and must not descend forever
        let resolver = Resolver::new(RootServers::default(), SharedCache::new());
        let addresses = resolver
            .nameserver_addresses(&[domain("ns1.example.net.")], 0)
            .await;

        assert!(addresses.is_empty());
    }

    fn matching_response() -> (Message, Message) {
        let request = Message::from_question(
            1234,
            Question {
                name: domain("www.example.com."),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );
        let response = request.make_response();

        (request, response)
    }
}
