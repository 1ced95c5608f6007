//! IANA Information Element ids and Private Enterprise Numbers used by the
//! field admissibility rules in spec §4.6.

pub const IANA_PEN: u32 = 0;
/// The IANA convention for encoding the reverse direction of a standard
/// (IANA, PEN 0) element.
pub const IANA_PEN_REVERSED: u32 = 29305;

pub const OCTET_DELTA_COUNT: u16 = 1;
pub const PACKET_DELTA_COUNT: u16 = 2;
pub const PROTOCOL_IDENTIFIER: u16 = 4;
pub const SOURCE_TRANSPORT_PORT: u16 = 7;
pub const SOURCE_IPV4_ADDRESS: u16 = 8;
pub const DESTINATION_TRANSPORT_PORT: u16 = 11;
pub const DESTINATION_IPV4_ADDRESS: u16 = 12;
pub const SOURCE_IPV6_ADDRESS: u16 = 27;
pub const DESTINATION_IPV6_ADDRESS: u16 = 28;

pub const SYSTEM_INIT_TIME_MS: u16 = 40;
pub const EXPORTED_MESSAGE_TOTAL_COUNT: u16 = 41;
pub const EXPORTED_FLOW_RECORD_TOTAL_COUNT: u16 = 42;

pub const COMMON_PROPERTIES_ID: u16 = 137;
pub const OBSERVATION_POINT_ID: u16 = 138;

pub const TEMPLATE_ID: u16 = 145;
pub const OBSERVATION_DOMAIN_ID: u16 = 149;

pub const EXPORTER_IPV4_ADDRESS: u16 = 130;
pub const EXPORTER_IPV6_ADDRESS: u16 = 131;
pub const COLLECTOR_IPV4_ADDRESS: u16 = 211;
pub const COLLECTOR_IPV6_ADDRESS: u16 = 212;
pub const EXPORT_INTERFACE: u16 = 213;
pub const EXPORT_PROTOCOL_VERSION: u16 = 214;
pub const EXPORT_TRANSPORT_PROTOCOL: u16 = 215;
pub const COLLECTOR_TRANSPORT_PORT: u16 = 216;
pub const EXPORTER_TRANSPORT_PORT: u16 = 217;

pub const FLOW_KEY_INDICATOR: u16 = 173;
pub const PADDING_OCTETS: u16 = 210;
pub const BIFLOW_DIRECTION: u16 = 239;

pub const EXPORTED_OCTET_TOTAL_COUNT: u16 = 163;
pub const EXPORTED_MESSAGE_OCTET_TOTAL_COUNT: u16 = 164;
pub const EXPORTED_FLOW_TOTAL_COUNT: u16 = 165;
pub const NOT_SENT_FLOW_TOTAL_COUNT: u16 = 166;
pub const NOT_SENT_PACKET_TOTAL_COUNT: u16 = 167;
pub const NOT_SENT_OCTET_TOTAL_COUNT: u16 = 168;

pub const BASIC_LIST: u16 = 291;
pub const SUB_TEMPLATE_LIST: u16 = 292;
pub const SUB_TEMPLATE_MULTI_LIST: u16 = 293;

/// The 5-tuple fields carried in a `FlowKey`; dropped unconditionally from
/// both halves of a biflow merge, then re-emitted once per §4.6.
const KEY_FIELD_IDS: &[u16] = &[
    PROTOCOL_IDENTIFIER,
    SOURCE_TRANSPORT_PORT,
    SOURCE_IPV4_ADDRESS,
    SOURCE_IPV6_ADDRESS,
    DESTINATION_TRANSPORT_PORT,
    DESTINATION_IPV4_ADDRESS,
    DESTINATION_IPV6_ADDRESS,
];

/// Exporter/collector identifiers, process statistics, and per-message
/// bookkeeping fields that describe the exporting process rather than the
/// flow itself: meaningless (or actively misleading) once duplicated onto
/// the reverse side of a merged record.
const NON_REVERSIBLE_FIELD_IDS: &[u16] = &[
    SYSTEM_INIT_TIME_MS,
    EXPORTED_MESSAGE_TOTAL_COUNT,
    EXPORTED_FLOW_RECORD_TOTAL_COUNT,
    COMMON_PROPERTIES_ID,
    OBSERVATION_POINT_ID,
    TEMPLATE_ID,
    OBSERVATION_DOMAIN_ID,
    EXPORTER_IPV4_ADDRESS,
    EXPORTER_IPV6_ADDRESS,
    COLLECTOR_IPV4_ADDRESS,
    COLLECTOR_IPV6_ADDRESS,
    EXPORT_INTERFACE,
    EXPORT_PROTOCOL_VERSION,
    EXPORT_TRANSPORT_PROTOCOL,
    COLLECTOR_TRANSPORT_PORT,
    EXPORTER_TRANSPORT_PORT,
    FLOW_KEY_INDICATOR,
    PADDING_OCTETS,
    BIFLOW_DIRECTION,
    EXPORTED_OCTET_TOTAL_COUNT,
    EXPORTED_MESSAGE_OCTET_TOTAL_COUNT,
    EXPORTED_FLOW_TOTAL_COUNT,
    NOT_SENT_FLOW_TOTAL_COUNT,
    NOT_SENT_PACKET_TOTAL_COUNT,
    NOT_SENT_OCTET_TOTAL_COUNT,
];

pub fn is_key_field(enterprise: u32, id: u16) -> bool {
    enterprise == IANA_PEN && KEY_FIELD_IDS.contains(&id)
}

pub fn is_non_reversible_field(enterprise: u32, id: u16) -> bool {
    enterprise == IANA_PEN && NON_REVERSIBLE_FIELD_IDS.contains(&id)
}

/// Data types spec §4.6's last rule drops on sight, regardless of side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Unsigned,
    Signed,
    Ipv4Addr,
    Ipv6Addr,
    OctetArray,
    BasicList,
    SubTemplateList,
    SubTemplateMultiList,
    Unassigned,
}

pub fn is_ignored_type(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::BasicList | DataType::SubTemplateList | DataType::SubTemplateMultiList | DataType::Unassigned
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_fields_are_recognized_only_for_iana_pen() {
        assert!(is_key_field(IANA_PEN, PROTOCOL_IDENTIFIER));
        assert!(is_key_field(IANA_PEN, SOURCE_IPV6_ADDRESS));
        assert!(!is_key_field(42, PROTOCOL_IDENTIFIER));
        assert!(!is_key_field(IANA_PEN, OCTET_DELTA_COUNT));
    }

    #[test]
    fn non_reversible_fields_cover_exporter_identity_and_stats() {
        assert!(is_non_reversible_field(IANA_PEN, BIFLOW_DIRECTION));
        assert!(is_non_reversible_field(IANA_PEN, EXPORTER_IPV4_ADDRESS));
        assert!(!is_non_reversible_field(IANA_PEN, PACKET_DELTA_COUNT));
    }

    #[test]
    fn list_and_unassigned_types_are_ignored() {
        assert!(is_ignored_type(DataType::BasicList));
        assert!(is_ignored_type(DataType::SubTemplateList));
        assert!(is_ignored_type(DataType::SubTemplateMultiList));
        assert!(is_ignored_type(DataType::Unassigned));
        assert!(!is_ignored_type(DataType::Unsigned));
    }
}
