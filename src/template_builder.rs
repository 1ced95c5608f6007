//! Appends field descriptors into a raw template body buffer, per spec
//! §4.3. The "intrusive byte buffer" rewrite spec §9 asks for: exact wire
//! layout, but through named append calls instead of hand-packed structs.

const ENTERPRISE_BIT: u16 = 0x8000;

#[derive(Debug, Default)]
pub struct TemplateBuilder {
    body: Vec<u8>,
    field_count: u16,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        TemplateBuilder::default()
    }

    /// Appends one field descriptor: `uint16 ie_id` (enterprise bit set
    /// when `enterprise != 0`), `uint16 length`, and `uint32 enterprise`
    /// when present.
    pub fn append(&mut self, ie_id: u16, length: u16, enterprise: u32) {
        let wire_id = if enterprise != 0 {
            ie_id | ENTERPRISE_BIT
        } else {
            ie_id
        };
        self.body.extend_from_slice(&wire_id.to_be_bytes());
        self.body.extend_from_slice(&length.to_be_bytes());
        if enterprise != 0 {
            self.body.extend_from_slice(&enterprise.to_be_bytes());
        }
        self.field_count += 1;
    }

    pub fn field_count(&self) -> u16 {
        self.field_count
    }

    pub fn is_empty(&self) -> bool {
        self.field_count == 0
    }

    /// Emits the template header `(template_id, field_count)` followed by
    /// the accumulated field descriptors.
    pub fn build(&self, template_id: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        out.extend_from_slice(&template_id.to_be_bytes());
        out.extend_from_slice(&self.field_count.to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}
