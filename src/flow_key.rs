//! The 5-tuple cache key, its CRC-64 hash, and extraction from a data
//! record, per spec §3 and §4.1.

use crc::{Crc, CRC_64_XZ};

use crate::error::{Error, Result};
use crate::iana;
use crate::ip_addr::IpAddr;
use crate::template::DataRecord;

/// CRC-64/XZ: the same polynomial and parameters as the `lzma_crc64`
/// routine this crate's hashing is generalized from.
const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// XORed into the checksum so the 13-byte (IPv4) and 37-byte (IPv6) hash
/// domains can never collide even if the underlying CRCs happen to match.
const WIDTH_DISCRIMINANT_V4: u64 = 0x0000_0000_0000_0004;
const WIDTH_DISCRIMINANT_V6: u64 = 0x0000_0000_0000_0006;

/// The 5-tuple plus arrival timestamp. Only the 5-tuple participates in
/// equality and hashing; `arrival_ts` is carried for expiry accounting.
#[derive(Debug, Clone, Copy)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub arrival_ts: u64,
}

impl FlowKey {
    pub fn reverse(&self) -> FlowKey {
        FlowKey {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
            arrival_ts: self.arrival_ts,
        }
    }

    fn cache_hash(&self) -> u64 {
        if self.src_ip.is_ip4() && self.dst_ip.is_ip4() {
            let mut buf = [0u8; 13];
            buf[0..4].copy_from_slice(&self.src_ip.as_v4_octets());
            buf[4..8].copy_from_slice(&self.dst_ip.as_v4_octets());
            buf[8..10].copy_from_slice(&self.src_port.to_ne_bytes());
            buf[10..12].copy_from_slice(&self.dst_port.to_ne_bytes());
            buf[12] = self.protocol;
            CRC64.checksum(&buf) ^ WIDTH_DISCRIMINANT_V4
        } else {
            let mut buf = [0u8; 37];
            buf[0..16].copy_from_slice(&self.src_ip.as_v6_octets());
            buf[16..32].copy_from_slice(&self.dst_ip.as_v6_octets());
            buf[32..34].copy_from_slice(&self.src_port.to_ne_bytes());
            buf[34..36].copy_from_slice(&self.dst_port.to_ne_bytes());
            buf[36] = self.protocol;
            CRC64.checksum(&buf) ^ WIDTH_DISCRIMINANT_V6
        }
    }
}

impl PartialEq for FlowKey {
    fn eq(&self, other: &Self) -> bool {
        self.src_ip == other.src_ip
            && self.dst_ip == other.dst_ip
            && self.src_port == other.src_port
            && self.dst_port == other.dst_port
            && self.protocol == other.protocol
    }
}

impl Eq for FlowKey {}

impl std::hash::Hash for FlowKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.cache_hash());
    }
}

fn extract_port(record: &DataRecord, id: u16) -> Option<u16> {
    record
        .find(iana::IANA_PEN, id)
        .and_then(|v| v.as_u64())
        .map(|v| v as u16)
}

fn extract_ip(record: &DataRecord, v4_id: u16, v6_id: u16) -> Option<IpAddr> {
    if let Some(view) = record.find(iana::IANA_PEN, v4_id) {
        return view.as_ipv4().map(IpAddr::from_v4_octets);
    }
    if let Some(view) = record.find(iana::IANA_PEN, v6_id) {
        return view.as_ipv6().map(IpAddr::from_v6_octets);
    }
    None
}

/// Extracts a `FlowKey` from a data record, per spec §4.1. `now` is the
/// caller's monotonic clock reading in whole seconds, stamped as
/// `arrival_ts`.
pub fn extract_key(record: &DataRecord, pair_missing_ports: bool, now: u64) -> Result<FlowKey> {
    let src_port = extract_port(record, iana::SOURCE_TRANSPORT_PORT);
    let dst_port = extract_port(record, iana::DESTINATION_TRANSPORT_PORT);

    let (src_port, dst_port) = match (src_port, dst_port) {
        (Some(s), Some(d)) => (s, d),
        _ if pair_missing_ports => (src_port.unwrap_or(0), dst_port.unwrap_or(0)),
        _ => return Err(Error::Format("missing transport port field".into())),
    };

    let protocol = record
        .find(iana::IANA_PEN, iana::PROTOCOL_IDENTIFIER)
        .and_then(|v| v.as_u64())
        .map(|v| v as u8)
        .ok_or_else(|| Error::Format("missing protocolIdentifier".into()))?;

    let dst_ip = extract_ip(record, iana::DESTINATION_IPV4_ADDRESS, iana::DESTINATION_IPV6_ADDRESS)
        .ok_or_else(|| Error::Format("missing destination address".into()))?;
    let src_ip = extract_ip(record, iana::SOURCE_IPV4_ADDRESS, iana::SOURCE_IPV6_ADDRESS)
        .ok_or_else(|| Error::Format("missing source address".into()))?;

    Ok(FlowKey {
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        arrival_ts: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{FieldSpec, Template, TemplateFlags};
    use std::net::Ipv4Addr;

    fn make_template() -> Template {
        Template::new(
            256,
            vec![
                FieldSpec { enterprise: 0, id: iana::SOURCE_TRANSPORT_PORT, length: 2 },
                FieldSpec { enterprise: 0, id: iana::DESTINATION_TRANSPORT_PORT, length: 2 },
                FieldSpec { enterprise: 0, id: iana::PROTOCOL_IDENTIFIER, length: 1 },
                FieldSpec { enterprise: 0, id: iana::SOURCE_IPV4_ADDRESS, length: 4 },
                FieldSpec { enterprise: 0, id: iana::DESTINATION_IPV4_ADDRESS, length: 4 },
            ],
            TemplateFlags::default(),
        )
    }

    fn make_record_bytes(src_port: u16, dst_port: u16, proto: u8, src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&src_port.to_be_bytes());
        buf.extend_from_slice(&dst_port.to_be_bytes());
        buf.push(proto);
        buf.extend_from_slice(&src);
        buf.extend_from_slice(&dst);
        buf
    }

    #[test]
    fn reverse_is_involutive() {
        let key = FlowKey {
            src_ip: IpAddr::from(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::from(Ipv4Addr::new(10, 0, 0, 2)),
            src_port: 1000,
            dst_port: 80,
            protocol: 6,
            arrival_ts: 100,
        };
        let back = key.reverse().reverse();
        assert_eq!(key, back);
    }

    #[test]
    fn extract_key_reads_s1_scenario_fields() {
        let tmplt = make_template();
        let bytes = make_record_bytes(1000, 80, 6, [10, 0, 0, 1], [10, 0, 0, 2]);
        let rec = DataRecord::new(&bytes, &tmplt);
        let key = extract_key(&rec, false, 100).unwrap();

        assert_eq!(key.src_port, 1000);
        assert_eq!(key.dst_port, 80);
        assert_eq!(key.protocol, 6);
        assert_eq!(key.src_ip.as_v4_octets(), [10, 0, 0, 1]);
        assert_eq!(key.dst_ip.as_v4_octets(), [10, 0, 0, 2]);
    }

    #[test]
    fn two_opposite_direction_records_reverse_to_the_same_key() {
        let tmplt = make_template();
        let r1 = make_record_bytes(1000, 80, 6, [10, 0, 0, 1], [10, 0, 0, 2]);
        let r2 = make_record_bytes(80, 1000, 6, [10, 0, 0, 2], [10, 0, 0, 1]);
        let k1 = extract_key(&DataRecord::new(&r1, &tmplt), false, 100).unwrap();
        let k2 = extract_key(&DataRecord::new(&r2, &tmplt), false, 101).unwrap();
        assert_eq!(k1.reverse(), k2);
    }

    #[test]
    fn missing_port_without_pair_missing_ports_is_a_format_error() {
        let tmplt = Template::new(
            256,
            vec![
                FieldSpec { enterprise: 0, id: iana::PROTOCOL_IDENTIFIER, length: 1 },
                FieldSpec { enterprise: 0, id: iana::SOURCE_IPV4_ADDRESS, length: 4 },
                FieldSpec { enterprise: 0, id: iana::DESTINATION_IPV4_ADDRESS, length: 4 },
            ],
            TemplateFlags::default(),
        );
        let mut bytes = Vec::new();
        bytes.push(17u8);
        bytes.extend_from_slice(&[10, 0, 0, 1]);
        bytes.extend_from_slice(&[10, 0, 0, 2]);
        let rec = DataRecord::new(&bytes, &tmplt);
        assert!(extract_key(&rec, false, 100).is_err());
    }

    #[test]
    fn missing_port_with_pair_missing_ports_defaults_to_zero() {
        let tmplt = Template::new(
            256,
            vec![
                FieldSpec { enterprise: 0, id: iana::PROTOCOL_IDENTIFIER, length: 1 },
                FieldSpec { enterprise: 0, id: iana::SOURCE_IPV4_ADDRESS, length: 4 },
                FieldSpec { enterprise: 0, id: iana::DESTINATION_IPV4_ADDRESS, length: 4 },
            ],
            TemplateFlags::default(),
        );
        let mut bytes = Vec::new();
        bytes.push(17u8);
        bytes.extend_from_slice(&[10, 0, 0, 2]);
        bytes.extend_from_slice(&[10, 0, 0, 1]);
        let rec = DataRecord::new(&bytes, &tmplt);
        let key = extract_key(&rec, true, 100).unwrap();
        assert_eq!(key.src_port, 0);
        assert_eq!(key.dst_port, 0);
    }

    #[test]
    fn v4_and_v6_hash_domains_do_not_collide_for_matching_bit_patterns() {
        let v4 = FlowKey {
            src_ip: IpAddr::from(Ipv4Addr::new(0, 0, 0, 0)),
            dst_ip: IpAddr::from(Ipv4Addr::new(0, 0, 0, 0)),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            arrival_ts: 0,
        };
        let v6 = FlowKey {
            src_ip: IpAddr::from_v6_octets([0; 16]),
            dst_ip: IpAddr::from_v6_octets([0; 16]),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            arrival_ts: 0,
        };
        assert_ne!(v4.cache_hash(), v6.cache_hash());
    }
}
