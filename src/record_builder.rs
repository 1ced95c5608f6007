//! Appends field values into a raw record body buffer, per spec §4.3.

use crate::ip_addr::IpAddr;
use crate::template::FieldView;

#[derive(Debug, Default)]
pub struct RecordBuilder {
    body: Vec<u8>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        RecordBuilder::default()
    }

    /// Appends 4 or 16 bytes depending on the address kind.
    pub fn append_ip(&mut self, addr: &IpAddr) {
        if addr.is_ip4() {
            self.body.extend_from_slice(&addr.as_v4_octets());
        } else {
            self.body.extend_from_slice(&addr.as_v6_octets());
        }
    }

    /// Appends `value` as `width` big-endian bytes (1, 2, 4, or 8).
    pub fn append_uint(&mut self, value: u64, width: u16) {
        let be = value.to_be_bytes();
        let start = be.len() - width as usize;
        self.body.extend_from_slice(&be[start..]);
    }

    /// Splices an original field's bytes exactly as they arrived.
    pub fn append_raw(&mut self, view: &FieldView) {
        self.body.extend_from_slice(view.data);
    }

    pub fn front(&self) -> &[u8] {
        &self.body
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}
