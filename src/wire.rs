//! Raw IPFIX message parsing: turns a UDP datagram into the pre-parsed
//! records and templates the pairing engine expects. Generalizes this
//! codebase's original hand-rolled `Header`/`SetHeader`/`TemplateHeader`
//! reading to the template/record types this crate now uses, and stands
//! in for the downstream IPFIX library's parsing that spec §1 places out
//! of scope.

use core::convert::TryInto;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::iana;
use crate::template::{FieldSpec, Template, TemplateFlags, OPTIONS_TEMPLATE_SET_ID, TEMPLATE_SET_ID};

pub const VERSION: u16 = 10;

#[derive(Debug)]
pub struct MessageHeader {
    pub version: u16,
    pub length: u16,
    pub export_time: u32,
    pub seq_number: u32,
    pub domain_id: u32,
}

impl MessageHeader {
    pub const SIZE: usize = 16;

    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::Format(format!(
                "message header truncated: need {} bytes, have {}",
                Self::SIZE,
                buf.len()
            )));
        }
        Ok(MessageHeader {
            version: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            length: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
            export_time: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            seq_number: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            domain_id: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
        })
    }
}

#[derive(Debug)]
struct SetHeader {
    id: u16,
    length: u16,
}

impl SetHeader {
    const SIZE: usize = 4;

    fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::Format("set header truncated".into()));
        }
        Ok(SetHeader {
            id: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            length: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
        })
    }
}

/// One exporter's previously learned templates, keyed by the id they were
/// sent under. Mirrors the per-exporter template tracking this codebase's
/// original listener kept, generalized to this crate's `Template` type.
#[derive(Default)]
pub struct InboundTemplates {
    templates: HashMap<u16, Arc<Template>>,
}

impl InboundTemplates {
    pub fn new() -> Self {
        InboundTemplates::default()
    }

    pub fn get(&self, id: u16) -> Option<Arc<Template>> {
        self.templates.get(&id).cloned()
    }

    fn learn(&mut self, template: Template) {
        self.templates.insert(template.id, Arc::new(template));
    }

    fn read_template_record(buf: &[u8], is_options: bool) -> Result<(Template, usize)> {
        if buf.len() < 4 {
            return Err(Error::Format("template record truncated".into()));
        }
        let id = u16::from_be_bytes(buf[0..2].try_into().unwrap());
        let field_count = u16::from_be_bytes(buf[2..4].try_into().unwrap());
        let mut offset = 4;

        if is_options {
            // Options templates carry a scope field count ahead of the
            // regular field count; it isn't needed to interpret the
            // remaining field specs, which are uniform either way, but its
            // two bytes must still be skipped.
            if buf.len() < 6 {
                return Err(Error::Format("options template record truncated".into()));
            }
            offset = 6;
        }

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let (field, consumed) = read_field_spec(&buf[offset..])?;
            fields.push(field);
            offset += consumed;
        }

        let is_biflow = fields.iter().any(|f| f.enterprise == iana::IANA_PEN && f.id == iana::BIFLOW_DIRECTION);

        Ok((
            Template::new(id, fields, TemplateFlags { is_options, is_biflow }),
            offset,
        ))
    }

    /// Learns every template record in a template (id 2) or options
    /// template (id 3) set body.
    fn learn_set(&mut self, set_id: u16, mut body: &[u8]) -> Result<()> {
        let is_options = set_id == OPTIONS_TEMPLATE_SET_ID;
        while body.len() >= 4 {
            let (template, consumed) = Self::read_template_record(body, is_options)?;
            self.learn(template);
            if consumed == 0 || consumed > body.len() {
                break;
            }
            body = &body[consumed..];
        }
        Ok(())
    }
}

fn read_field_spec(buf: &[u8]) -> Result<(FieldSpec, usize)> {
    const ENTERPRISE_BIT: u16 = 0x8000;
    if buf.len() < 4 {
        return Err(Error::Format("field spec truncated".into()));
    }
    let raw_id = u16::from_be_bytes(buf[0..2].try_into().unwrap());
    let length = u16::from_be_bytes(buf[2..4].try_into().unwrap());
    let id = raw_id & !ENTERPRISE_BIT;

    if raw_id & ENTERPRISE_BIT != 0 {
        if buf.len() < 8 {
            return Err(Error::Format("enterprise field spec truncated".into()));
        }
        let enterprise = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        Ok((FieldSpec { enterprise, id, length }, 8))
    } else {
        Ok((FieldSpec { enterprise: 0, id, length }, 4))
    }
}

/// One parsed data record, owning a copy of its raw bytes and a handle to
/// its governing template.
pub struct ParsedRecord {
    pub bytes: Vec<u8>,
    pub template: Arc<Template>,
}

/// A fully parsed inbound message: its header plus every data record in
/// source order, templates already resolved against `InboundTemplates`.
pub struct ParsedMessage {
    pub header: MessageHeader,
    pub records: Vec<ParsedRecord>,
}

/// Parses one UDP datagram, learning any template/options-template sets
/// into `templates` and resolving every data set against it.
pub fn parse_message(buf: &[u8], templates: &mut InboundTemplates) -> Result<ParsedMessage> {
    let header = MessageHeader::read(buf)?;
    if header.version != VERSION {
        return Err(Error::Format(format!("unsupported message version {}", header.version)));
    }

    let mut offset = MessageHeader::SIZE;
    let mut records = Vec::new();

    while offset + SetHeader::SIZE <= buf.len() {
        let set_header = SetHeader::read(&buf[offset..])?;
        let set_len = set_header.length as usize;
        if set_len < SetHeader::SIZE || offset + set_len > buf.len() {
            return Err(Error::Format("set length out of bounds".into()));
        }
        let body = &buf[offset + SetHeader::SIZE..offset + set_len];

        match set_header.id {
            TEMPLATE_SET_ID | OPTIONS_TEMPLATE_SET_ID => {
                templates.learn_set(set_header.id, body)?;
            }
            id if id >= crate::template::MIN_DATA_SET_ID => {
                let template = templates
                    .get(id)
                    .ok_or_else(|| Error::Format(format!("data set references unknown template {}", id)))?;

                let mut rec_offset = 0;
                let record_len: usize = template.fields.iter().map(|f| f.length as usize).sum();
                if record_len == 0 {
                    return Err(Error::Format("template has zero-length record".into()));
                }
                while rec_offset + record_len <= body.len() {
                    records.push(ParsedRecord {
                        bytes: body[rec_offset..rec_offset + record_len].to_vec(),
                        template: template.clone(),
                    });
                    rec_offset += record_len;
                }
            }
            other => {
                return Err(Error::Format(format!("unexpected set id {}", other)));
            }
        }

        offset += set_len;
    }

    Ok(ParsedMessage { header, records })
}
