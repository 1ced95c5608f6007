//! Owned, cached copy of one data record's raw bytes, per spec §3.

/// A record sitting in the pairing cache, waiting for its counterpart or
/// for expiry. `output_template_id` is the id this record was *stored*
/// under — the uniflow-remapped output id, never the inbound template id
/// — so it can be re-emitted as a passthrough without re-resolving it.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    pub bytes: Vec<u8>,
    pub output_template_id: u16,
    pub arrival_ts: u64,
}

impl RecordBuffer {
    pub fn new(bytes: Vec<u8>, output_template_id: u16, arrival_ts: u64) -> Self {
        RecordBuffer {
            bytes,
            output_template_id,
            arrival_ts,
        }
    }
}
