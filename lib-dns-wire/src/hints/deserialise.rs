//! Parsing of root hints files.
//!
//! The format is a simplified master file: one record per line, four
//! whitespace-separated fields:
//!
//! ```text
//! <name> <ttl> <type> <rdata>
//! ```
//!
//! Lines starting with `;` are comments.  Blank lines, and lines
//! which do not have exactly four fields, are skipped.  The type
//! field is case-insensitive and must be one of A, NS, or AAAA - the
//! record kinds a hints file can meaningfully seed.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::hints::types::Hints;
use crate::protocol::types::{
    DomainName, RecordClass, RecordType, RecordTypeWithData, ResourceRecord,
};

impl Hints {
    /// Parse a string of hints data.
    ///
    /// # Errors
    ///
    /// If a record line has a field which cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut hints = Self::default();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let fields = line.split_whitespace().collect::<Vec<_>>();
            if fields.len() != 4 {
                continue;
            }

            hints.parse_record(fields[0], fields[1], fields[2], fields[3])?;
        }
        Ok(hints)
    }

    fn parse_record(
        &mut self,
        name: &str,
        ttl: &str,
        rtype: &str,
        rdata: &str,
    ) -> Result<(), Error> {
        let name = parse_name(name).ok_or_else(|| Error::CouldNotParseName { name: name.into() })?;
        let ttl = ttl
            .parse::<u32>()
            .map_err(|_| Error::CouldNotParseTtl { ttl: ttl.into() })?;

        let rtype_with_data = match rtype.to_ascii_uppercase().as_str() {
            "A" => RecordTypeWithData::A {
                address: Ipv4Addr::from_str(rdata).map_err(|_| Error::CouldNotParseAddress {
                    rtype: RecordType::A,
                    address: rdata.into(),
                })?,
            },
            "AAAA" => RecordTypeWithData::AAAA {
                address: Ipv6Addr::from_str(rdata).map_err(|_| Error::CouldNotParseAddress {
                    rtype: RecordType::AAAA,
                    address: rdata.into(),
                })?,
            },
            "NS" => {
                let nsdname = parse_name(rdata).ok_or_else(|| Error::CouldNotParseName {
                    name: rdata.into(),
                })?;
                self.root_server_names.push(nsdname.clone());
                RecordTypeWithData::NS { nsdname }
            }
            _ => {
                return Err(Error::UnsupportedRecordType {
                    rtype: rtype.into(),
                })
            }
        };

        self.records.push(ResourceRecord {
            name,
            rtype_with_data,
            rclass: RecordClass::IN,
            ttl,
        });
        Ok(())
    }
}

// root NS records are owned by `.` itself, which the sanitised form
// cannot express
fn parse_name(token: &str) -> Option<DomainName> {
    if token == "." {
        Some(DomainName::root_domain())
    } else {
        DomainName::sanitise(token)
    }
}

/// An error that can occur when parsing a hints file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    CouldNotParseName {
        name: String,
    },
    CouldNotParseTtl {
        ttl: String,
    },
    CouldNotParseAddress {
        rtype: RecordType,
        address: String,
    },
    UnsupportedRecordType {
        rtype: String,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CouldNotParseName { name } => write!(f, "could not parse name '{name}'"),
            Error::CouldNotParseTtl { ttl } => write!(f, "could not parse ttl '{ttl}'"),
            Error::CouldNotParseAddress { rtype, address } => {
                write!(f, "could not parse {rtype} address '{address}'")
            }
            Error::UnsupportedRecordType { rtype } => {
                write!(f, "unsupported record type '{rtype}' in hints")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    const SAMPLE: &str = "
;       This file holds the information on root name servers needed to
;       initialize cache of Internet domain name servers.
.                        3600000      NS    A.ROOT-SERVERS.NET.
A.ROOT-SERVERS.NET.      3600000      A     198.41.0.4
A.ROOT-SERVERS.NET.      3600000      AAAA  2001:503:ba3e::2:30
.                        3600000      NS    B.ROOT-SERVERS.NET.
B.ROOT-SERVERS.NET.      3600000      A     170.247.170.2
; End of file
";

    #[test]
    fn deserialise_parses_records_and_root_names() {
        let hints = Hints::deserialise(SAMPLE).unwrap();

        assert_eq!(5, hints.records.len());
        assert_eq!(
            vec![domain("a.root-servers.net."), domain("b.root-servers.net.")],
            hints.root_server_names
        );

        assert_eq!(
            ResourceRecord {
                name: DomainName::root_domain(),
                rtype_with_data: RecordTypeWithData::NS {
                    nsdname: domain("a.root-servers.net."),
                },
                rclass: RecordClass::IN,
                ttl: 3600000,
            },
            hints.records[0]
        );
        assert_eq!(
            RecordTypeWithData::A {
                address: "198.41.0.4".parse().unwrap(),
            },
            hints.records[1].rtype_with_data
        );
        assert_eq!(
            RecordTypeWithData::AAAA {
                address: "2001:503:ba3e::2:30".parse().unwrap(),
            },
            hints.records[2].rtype_with_data
        );
    }

    #[test]
    fn deserialise_lowercases_names() {
        let hints = Hints::deserialise("A.ROOT-SERVERS.NET. 3600000 A 198.41.0.4").unwrap();
        assert_eq!(domain("a.root-servers.net."), hints.records[0].name);
    }

    #[test]
    fn deserialise_type_is_case_insensitive() {
        let hints = Hints::deserialise(". 3600000 ns a.root-servers.net.").unwrap();
        assert_eq!(RecordType::NS, hints.records[0].rtype_with_data.rtype());
    }

    #[test]
    fn deserialise_skips_malformed_line_shapes() {
        let hints = Hints::deserialise(
            "a.example.com.\nfoo 300 A\nfoo 300 A 1.2.3.4 extra\nfoo 300 A 1.2.3.4",
        )
        .unwrap();
        assert_eq!(1, hints.records.len());
    }

    #[test]
    fn deserialise_rejects_bad_fields() {
        assert_eq!(
            Err(Error::CouldNotParseTtl {
                ttl: "soon".into()
            }),
            Hints::deserialise("foo. soon A 1.2.3.4")
        );
        assert_eq!(
            Err(Error::UnsupportedRecordType {
                rtype: "MX".into()
            }),
            Hints::deserialise("foo. 300 MX mail.foo.")
        );
        assert_eq!(
            Err(Error::CouldNotParseAddress {
                rtype: RecordType::A,
                address: "not-an-address".into()
            }),
            Hints::deserialise("foo. 300 A not-an-address")
        );
        assert_eq!(
            Err(Error::CouldNotParseAddress {
                rtype: RecordType::AAAA,
                address: "1.2.3.4".into()
            }),
            Hints::deserialise("foo. 300 AAAA 1.2.3.4")
        );
    }
}
