//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Self::deserialise(&mut ConsumableBuffer::new(octets))
    }

    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let wire_header = WireHeader::deserialise(buffer)?;
        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        let mut answers = Vec::with_capacity(wire_header.ancount.into());
        let mut authority = Vec::with_capacity(wire_header.nscount.into());
        let mut additional = Vec::with_capacity(wire_header.arcount.into());

        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(wire_header.header.id, buffer)?);
        }
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(wire_header.header.id, buffer)?);
        }
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(wire_header.header.id, buffer)?);
        }
        for _ in 0..wire_header.arcount {
            additional.push(ResourceRecord::deserialise(wire_header.header.id, buffer)?);
        }

        Ok(Self {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                authentic_data: flags2 & HEADER_MASK_AD != 0,
                checking_disabled: flags2 & HEADER_MASK_CD != 0,
                rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the question cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = RecordType::deserialise(id, buffer)?;
        let qclass = RecordClass::deserialise(id, buffer)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let rtype = RecordType::deserialise(id, buffer)?;
        let rclass = RecordClass::deserialise(id, buffer)?;
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;

        let rdata_start = buffer.position;

        let mut raw_rdata = || {
            if let Some(octets) = buffer.take(rdlength as usize) {
                Ok(octets.to_vec())
            } else {
                Err(Error::ResourceRecordTooShort(id))
            }
        };

        // for records which include domain names, deserialise them to
        // expand pointers.
        let rtype_with_data = match rtype {
            RecordType::A => RecordTypeWithData::A {
                address: Ipv4Addr::from(
                    buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                ),
            },
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::SOA => RecordTypeWithData::SOA {
                mname: DomainName::deserialise(id, buffer)?,
                rname: DomainName::deserialise(id, buffer)?,
                serial: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                refresh: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                retry: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                expire: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                minimum: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
            },
            RecordType::PTR => RecordTypeWithData::PTR {
                ptrdname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::AAAA => RecordTypeWithData::AAAA {
                address: Ipv6Addr::new(
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                    buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                ),
            },
            RecordType::Unknown(tag) => RecordTypeWithData::Unknown {
                tag,
                octets: raw_rdata()?,
            },
        };

        let rdata_stop = buffer.position;

        // the RDLENGTH field bounds the RDATA: a name inside it may
        // point earlier into the message, but the octets consumed
        // here must be exactly the declared length.
        if rdata_stop == rdata_start + (rdlength as usize) {
            Ok(Self {
                name,
                rtype_with_data,
                rclass,
                ttl,
            })
        } else {
            Err(Error::ResourceRecordInvalid(id))
        }
    }
}

impl DomainName {
    /// # Errors
    ///
    /// If the domain cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let mut octets = Vec::<u8>::with_capacity(DOMAINNAME_MAX_LEN);
        let mut labels = Vec::<Vec<u8>>::with_capacity(5);
        let start = buffer.position;

        'outer: loop {
            let size = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;

            if usize::from(size) <= LABEL_MAX_LEN {
                octets.push(size);

                if size == 0 {
                    labels.push(Vec::new());
                    break 'outer;
                }

                if let Some(os) = buffer.take(size as usize) {
                    let mut label = Vec::<u8>::with_capacity(size as usize);
                    for o in os {
                        // names compare case-insensitively, so fold
                        // to the lowercase canonical form here
                        let o = o.to_ascii_lowercase();
                        label.push(o);
                        octets.push(o);
                    }
                    labels.push(label);
                } else {
                    return Err(Error::DomainTooShort(id));
                }

                if octets.len() > DOMAINNAME_MAX_LEN {
                    break 'outer;
                }
            } else if size & 0b1100_0000 == 0b1100_0000 {
                // a compression pointer: the top two bits flag it,
                // the remaining 14 bits (spanning both octets) are an
                // absolute offset into the message.  This requires
                // re-parsing the pointed-to domain - not great but
                // works for now.
                let hi = size & 0b0011_1111;
                let lo = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;
                let ptr = u16::from_be_bytes([hi, lo]).into();

                // pointer must be to an earlier record (not merely a
                // different one: an earlier one: RFC 1035 section
                // 4.1.4) - this also rules out pointer cycles
                if ptr >= start {
                    return Err(Error::DomainPointerInvalid(id));
                }

                let mut other = DomainName::deserialise(id, &mut buffer.at_offset(ptr))?;
                octets.append(&mut other.octets);
                labels.append(&mut other.labels);
                break 'outer;
            } else {
                return Err(Error::DomainLabelInvalid(id));
            }
        }

        if octets.len() <= DOMAINNAME_MAX_LEN {
            Ok(DomainName { octets, labels })
        } else {
            Err(Error::DomainTooLong(id))
        }
    }
}

impl RecordType {
    /// # Errors
    ///
    /// If the record type is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordClass {
    /// # Errors
    ///
    /// If the record class is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header - so
/// that the failure can be linked back to the query it came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A resource record ends with an incomplete field.
    ResourceRecordTooShort(u16),

    /// A resource record is the wrong format.
    ResourceRecordInvalid(u16),

    /// A domain is incomplete.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer points to or after the current record.
    DomainPointerInvalid(u16),

    /// A domain label is longer than 63 octets, but not a pointer.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id) => Some(id),
            Error::ResourceRecordTooShort(id) => Some(id),
            Error::ResourceRecordInvalid(id) => Some(id),
            Error::DomainTooShort(id) => Some(id),
            Error::DomainTooLong(id) => Some(id),
            Error::DomainPointerInvalid(id) => Some(id),
            Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "datagram too short to contain an ID"),
            Error::HeaderTooShort(_) => write!(f, "header too short"),
            Error::ResourceRecordTooShort(_) => write!(f, "resource record too short"),
            Error::ResourceRecordInvalid(_) => write!(f, "resource record invalid"),
            Error::DomainTooShort(_) => write!(f, "domain incomplete"),
            Error::DomainTooLong(_) => write!(f, "domain over 255 octets"),
            Error::DomainPointerInvalid(_) => write!(f, "domain pointer not strictly backwards"),
            Error::DomainLabelInvalid(_) => write!(f, "domain label invalid"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.octets.len() > self.position {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.octets.len() > self.position + 1 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.octets.len() > self.position + 3 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            let c = self.octets[self.position + 2];
            let d = self.octets[self.position + 3];
            self.position += 4;
            Some(u32::from_be_bytes([a, b, c, d]))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn test_header_unpacking() {
        // a recursive response to query 0x1234 with two answers
        let octets = [0x12, 0x34, 0x81, 0x80, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00];
        let wire_header = WireHeader::deserialise(&mut ConsumableBuffer::new(&octets)).unwrap();

        assert_eq!(0x1234, wire_header.header.id);
        assert!(wire_header.header.is_response);
        assert_eq!(Opcode::Standard, wire_header.header.opcode);
        assert!(!wire_header.header.is_authoritative);
        assert!(!wire_header.header.is_truncated);
        assert!(wire_header.header.recursion_desired);
        assert!(wire_header.header.recursion_available);
        assert!(!wire_header.header.authentic_data);
        assert!(!wire_header.header.checking_disabled);
        assert_eq!(Rcode::NoError, wire_header.header.rcode);
        assert_eq!(1, wire_header.qdcount);
        assert_eq!(2, wire_header.ancount);
        assert_eq!(0, wire_header.nscount);
        assert_eq!(0, wire_header.arcount);
    }

    #[test]
    fn test_header_unpacking_ad_cd() {
        let octets = [0, 7, 0x00, 0b0011_0000, 0, 0, 0, 0, 0, 0, 0, 0];
        let wire_header = WireHeader::deserialise(&mut ConsumableBuffer::new(&octets)).unwrap();

        assert!(wire_header.header.authentic_data);
        assert!(wire_header.header.checking_disabled);
        assert!(!wire_header.header.recursion_available);
    }

    #[test]
    fn test_truncated_header_errors() {
        assert_eq!(
            Err(Error::CompletelyBusted),
            WireHeader::deserialise(&mut ConsumableBuffer::new(&[0x01]))
        );
        assert_eq!(
            Err(Error::HeaderTooShort(0x0102)),
            WireHeader::deserialise(&mut ConsumableBuffer::new(&[0x01, 0x02, 0x03]))
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_name_decompression() {
        // "ns1.example.com." where "example.com." is written at
        // offset 0 and pointed to from offset 13
        let octets = [
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0,
            3, b'n', b's', b'1', 0b1100_0000, 0,
        ];

        let mut buffer = ConsumableBuffer::new(&octets).at_offset(13);
        let name = DomainName::deserialise(0, &mut buffer).unwrap();

        assert_eq!(domain("ns1.example.com."), name);
        // the pointer costs two octets in the current position
        assert_eq!(octets.len(), buffer.position);
    }

    #[test]
    #[rustfmt::skip]
    fn test_name_decompression_uses_both_pointer_octets() {
        // 256 octets of padding so the target offset does not fit in
        // a single octet
        let mut octets = vec![0; 256];
        octets.extend_from_slice(&[3, b'w', b'w', b'w', 0]);
        let target = 256;
        octets.extend_from_slice(&[
            0b1100_0000 | u8::try_from(target >> 8).unwrap(),
            u8::try_from(target & 0xff).unwrap(),
        ]);

        let mut buffer = ConsumableBuffer::new(&octets).at_offset(261);
        let name = DomainName::deserialise(0, &mut buffer).unwrap();

        assert_eq!(domain("www."), name);
    }

    #[test]
    fn test_name_lowercased_on_decode() {
        let octets = [3, b'W', b'w', b'W', 2, b'E', b'x', 0];
        let name = DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets)).unwrap();

        assert_eq!(domain("www.ex."), name);
    }

    #[test]
    fn test_forward_pointer_is_an_error() {
        // a pointer may only point strictly backwards
        let octets = [0b1100_0000, 2, 0];
        assert_eq!(
            Err(Error::DomainPointerInvalid(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    fn test_self_pointer_is_an_error() {
        let octets = [0, 0b1100_0000, 1];
        assert_eq!(
            Err(Error::DomainPointerInvalid(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets).at_offset(1))
        );
    }

    #[test]
    fn test_overlong_label_is_an_error() {
        // 64 is neither a valid length nor a pointer tag
        let mut octets = vec![64];
        octets.extend_from_slice(&[b'x'; 64]);
        octets.push(0);
        assert_eq!(
            Err(Error::DomainLabelInvalid(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    fn test_unterminated_name_is_an_error() {
        let octets = [3, b'w', b'w', b'w'];
        assert_eq!(
            Err(Error::DomainTooShort(0)),
            DomainName::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_rdlength_must_match_consumed_rdata() {
        // an NS record whose RDLENGTH claims 6 octets but whose name
        // only consumes 4
        let octets = [
            3, b'f', b'o', b'o', 0, // NAME
            0, 2, // TYPE (NS)
            0, 1, // CLASS (IN)
            0, 0, 1, 44, // TTL
            0, 6, // RDLENGTH (wrong)
            2, b'n', b's', 0, // RDATA (4 octets)
            0, // trailing octet the RDLENGTH claims
        ];
        assert_eq!(
            Err(Error::ResourceRecordInvalid(0)),
            ResourceRecord::deserialise(0, &mut ConsumableBuffer::new(&octets))
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_unknown_rdata_is_skipped_by_rdlength() {
        // type 99 is not interpreted: the RDATA comes through as
        // opaque octets
        let octets = [
            3, b'f', b'o', b'o', 0, // NAME
            0, 99, // TYPE
            0, 1, // CLASS (IN)
            0, 0, 1, 44, // TTL
            0, 3, // RDLENGTH
            1, 2, 3, // RDATA
        ];
        let rr = ResourceRecord::deserialise(0, &mut ConsumableBuffer::new(&octets)).unwrap();

        assert_eq!(RecordType::from(99), rr.rtype_with_data.rtype());
        match rr.rtype_with_data {
            RecordTypeWithData::Unknown { octets, .. } => assert_eq!(vec![1, 2, 3], octets),
            other => panic!("expected opaque RDATA, got {other:?}"),
        }
    }

    #[test]
    #[rustfmt::skip]
    fn test_compressed_name_in_rdata_is_bounded_by_rdlength() {
        // a CNAME whose RDATA is a pointer back to the owner name:
        // two octets of RDATA expanding to a full name
        let octets = [
            3, b'f', b'o', b'o', 0, // NAME at offset 0
            0, 5, // TYPE (CNAME)
            0, 1, // CLASS (IN)
            0, 0, 1, 44, // TTL
            0, 2, // RDLENGTH
            0b1100_0000, 0, // RDATA: pointer to offset 0
        ];
        let rr = ResourceRecord::deserialise(0, &mut ConsumableBuffer::new(&octets)).unwrap();

        assert_eq!(
            RecordTypeWithData::CNAME { cname: domain("foo.") },
            rr.rtype_with_data
        );
    }
}
