//! Stands in for the downstream IE (Information Element) manager: given a
//! `(pen, id)` pair, reports the element's wire data type and, for
//! enterprise-private elements, its registered reverse-direction element id.
//!
//! A production deployment would consult the host pipeline's IE manager,
//! which is out of scope here (see spec §1); this is a small built-in table
//! covering the elements spec.md's scenarios and field admissibility rules
//! actually exercise.

use crate::iana::{self, DataType};

pub struct IeDef {
    pub data_type: DataType,
    /// Only ever `Some` for enterprise-private (`pen != 0`) elements that
    /// have an explicit reverse-direction counterpart distinct from the
    /// IANA reverse-PEN convention.
    pub reverse_id: Option<u16>,
}

const IANA_DEFS: &[(u16, DataType)] = &[
    (iana::OCTET_DELTA_COUNT, DataType::Unsigned),
    (iana::PACKET_DELTA_COUNT, DataType::Unsigned),
    (iana::PROTOCOL_IDENTIFIER, DataType::Unsigned),
    (iana::SOURCE_TRANSPORT_PORT, DataType::Unsigned),
    (iana::SOURCE_IPV4_ADDRESS, DataType::Ipv4Addr),
    (iana::DESTINATION_TRANSPORT_PORT, DataType::Unsigned),
    (iana::DESTINATION_IPV4_ADDRESS, DataType::Ipv4Addr),
    (iana::SOURCE_IPV6_ADDRESS, DataType::Ipv6Addr),
    (iana::DESTINATION_IPV6_ADDRESS, DataType::Ipv6Addr),
    (iana::SYSTEM_INIT_TIME_MS, DataType::Unsigned),
    (iana::EXPORTED_MESSAGE_TOTAL_COUNT, DataType::Unsigned),
    (iana::EXPORTED_FLOW_RECORD_TOTAL_COUNT, DataType::Unsigned),
    (iana::COMMON_PROPERTIES_ID, DataType::Unsigned),
    (iana::OBSERVATION_POINT_ID, DataType::Unsigned),
    (iana::TEMPLATE_ID, DataType::Unsigned),
    (iana::OBSERVATION_DOMAIN_ID, DataType::Unsigned),
    (iana::EXPORTER_IPV4_ADDRESS, DataType::Ipv4Addr),
    (iana::EXPORTER_IPV6_ADDRESS, DataType::Ipv6Addr),
    (iana::COLLECTOR_IPV4_ADDRESS, DataType::Ipv4Addr),
    (iana::COLLECTOR_IPV6_ADDRESS, DataType::Ipv6Addr),
    (iana::EXPORT_INTERFACE, DataType::Unsigned),
    (iana::EXPORT_PROTOCOL_VERSION, DataType::Unsigned),
    (iana::EXPORT_TRANSPORT_PROTOCOL, DataType::Unsigned),
    (iana::COLLECTOR_TRANSPORT_PORT, DataType::Unsigned),
    (iana::EXPORTER_TRANSPORT_PORT, DataType::Unsigned),
    (iana::FLOW_KEY_INDICATOR, DataType::Unsigned),
    (iana::PADDING_OCTETS, DataType::OctetArray),
    (iana::BIFLOW_DIRECTION, DataType::Unsigned),
    (iana::EXPORTED_OCTET_TOTAL_COUNT, DataType::Unsigned),
    (iana::EXPORTED_MESSAGE_OCTET_TOTAL_COUNT, DataType::Unsigned),
    (iana::EXPORTED_FLOW_TOTAL_COUNT, DataType::Unsigned),
    (iana::NOT_SENT_FLOW_TOTAL_COUNT, DataType::Unsigned),
    (iana::NOT_SENT_PACKET_TOTAL_COUNT, DataType::Unsigned),
    (iana::NOT_SENT_OCTET_TOTAL_COUNT, DataType::Unsigned),
    (iana::BASIC_LIST, DataType::BasicList),
    (iana::SUB_TEMPLATE_LIST, DataType::SubTemplateList),
    (iana::SUB_TEMPLATE_MULTI_LIST, DataType::SubTemplateMultiList),
];

/// A small demonstration vendor PEN with a couple of elements that have an
/// explicit, distinct reverse-direction id rather than relying on the
/// reverse-PEN convention (which only applies to IANA elements).
pub const EXAMPLE_VENDOR_PEN: u32 = 44913;
const VENDOR_DEFS: &[(u16, DataType, Option<u16>)] = &[
    (1, DataType::Unsigned, Some(2)),
    (2, DataType::Unsigned, Some(1)),
    (10, DataType::OctetArray, None),
];

pub fn lookup(enterprise: u32, id: u16) -> Option<IeDef> {
    if enterprise == iana::IANA_PEN {
        return IANA_DEFS
            .iter()
            .find(|(def_id, _)| *def_id == id)
            .map(|(_, data_type)| IeDef {
                data_type: *data_type,
                reverse_id: None,
            });
    }

    if enterprise == EXAMPLE_VENDOR_PEN {
        return VENDOR_DEFS
            .iter()
            .find(|(def_id, _, _)| *def_id == id)
            .map(|(_, data_type, reverse_id)| IeDef {
                data_type: *data_type,
                reverse_id: *reverse_id,
            });
    }

    None
}

/// Per spec §9/the source this is generalized from: IANA elements are
/// always assumed resolvable, so this only ever returns `Some` after
/// consulting a non-IANA (enterprise-private) lookup.
pub fn reverse_definition(enterprise: u32, id: u16) -> Option<u16> {
    if enterprise == iana::IANA_PEN {
        return None;
    }
    lookup(enterprise, id).and_then(|def| def.reverse_id)
}
