//! Wire-level template and field-view types, generalized from this
//! codebase's original IPFIX parsing to carry the extra bookkeeping the
//! pairing engine needs (biflow/options flags) and to expose a read-only
//! field cursor instead of the mutation-by-iterator pattern spec §9 flags
//! for replacement.

use core::convert::TryInto;
use std::fmt;

use crate::error::{Error, Result};

pub const TEMPLATE_SET_ID: u16 = 2;
pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
pub const MIN_DATA_SET_ID: u16 = 256;

const ENTERPRISE_BIT: u16 = 0x8000;

/// One field descriptor inside a template: an information element id
/// (enterprise-namespaced), its fixed wire length, and the enterprise
/// number (0 for IANA-standard elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub enterprise: u32,
    pub id: u16,
    pub length: u16,
}

impl FieldSpec {
    pub const SIZE_NO_ENTERPRISE: usize = 4;
    pub const SIZE_WITH_ENTERPRISE: usize = 8;

    pub fn wire_size(&self) -> usize {
        if self.enterprise == 0 {
            Self::SIZE_NO_ENTERPRISE
        } else {
            Self::SIZE_WITH_ENTERPRISE
        }
    }

    fn read(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < Self::SIZE_NO_ENTERPRISE {
            return Err(Error::Format(format!(
                "template field truncated: need {} bytes, have {}",
                Self::SIZE_NO_ENTERPRISE,
                buf.len()
            )));
        }
        let raw_id = u16::from_be_bytes(buf[0..2].try_into().unwrap());
        let length = u16::from_be_bytes(buf[2..4].try_into().unwrap());
        let id = raw_id & !ENTERPRISE_BIT;

        if raw_id & ENTERPRISE_BIT != 0 {
            if buf.len() < Self::SIZE_WITH_ENTERPRISE {
                return Err(Error::Format(format!(
                    "enterprise template field truncated: need {} bytes, have {}",
                    Self::SIZE_WITH_ENTERPRISE,
                    buf.len()
                )));
            }
            let enterprise = u32::from_be_bytes(buf[4..8].try_into().unwrap());
            Ok((
                FieldSpec {
                    enterprise,
                    id,
                    length,
                },
                Self::SIZE_WITH_ENTERPRISE,
            ))
        } else {
            Ok((
                FieldSpec {
                    enterprise: 0,
                    id,
                    length,
                },
                Self::SIZE_NO_ENTERPRISE,
            ))
        }
    }
}

/// Flags carried alongside a template's field list that the pairing engine
/// needs to decide how to treat records governed by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateFlags {
    pub is_options: bool,
    pub is_biflow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<FieldSpec>,
    pub flags: TemplateFlags,
}

impl Template {
    pub fn new(id: u16, fields: Vec<FieldSpec>, flags: TemplateFlags) -> Self {
        Template { id, fields, flags }
    }

    /// Byte length of this template's body when written to the wire,
    /// including the 4-byte template header but excluding enterprise
    /// scope fields (options templates aren't constructed by this crate).
    pub fn wire_len(&self) -> usize {
        4 + self.fields.iter().map(FieldSpec::wire_size).sum::<usize>()
    }

    /// The downstream template manager's comparator: bitwise-identical
    /// field lists, enterprise-aware, ignoring the assigned id.
    pub fn semantically_eq(&self, other: &Template) -> bool {
        self.fields == other.fields
    }

    /// Re-parses a raw `(template_id, field_count, field...)` body,
    /// standing in for the structural validation the downstream IPFIX
    /// library performs when a generated template is registered (spec
    /// §4.5's `create_biflow`).
    pub fn parse(buf: &[u8], flags: TemplateFlags) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::Format("template body shorter than its header".into()));
        }
        let id = u16::from_be_bytes(buf[0..2].try_into().unwrap());
        let field_count = u16::from_be_bytes(buf[2..4].try_into().unwrap());

        let mut fields = Vec::with_capacity(field_count as usize);
        let mut offset = 4;
        for _ in 0..field_count {
            let (field, consumed) = FieldSpec::read(&buf[offset..])?;
            fields.push(field);
            offset += consumed;
        }

        if fields.is_empty() {
            return Err(Error::Format("template has no fields".into()));
        }

        Ok(Template::new(id, fields, flags))
    }
}

/// A read-only view onto one field's raw bytes inside a data record, paired
/// with the information element id and enterprise number its governing
/// template assigned it.
#[derive(Clone, Copy)]
pub struct FieldView<'a> {
    pub enterprise: u32,
    pub id: u16,
    pub data: &'a [u8],
}

impl<'a> FieldView<'a> {
    pub fn length(&self) -> u16 {
        self.data.len() as u16
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.data.len() {
            1 => Some(self.data[0] as u64),
            2 => Some(u16::from_be_bytes(self.data.try_into().unwrap()) as u64),
            4 => Some(u32::from_be_bytes(self.data.try_into().unwrap()) as u64),
            8 => Some(u64::from_be_bytes(self.data.try_into().unwrap())),
            _ => None,
        }
    }

    pub fn as_ipv4(&self) -> Option<[u8; 4]> {
        self.data.try_into().ok()
    }

    pub fn as_ipv6(&self) -> Option<[u8; 16]> {
        self.data.try_into().ok()
    }
}

impl<'a> fmt::Debug for FieldView<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FieldView {{ enterprise: {}, id: {}, len: {} }}",
            self.enterprise,
            self.id,
            self.data.len()
        )
    }
}

/// A record's raw body paired with the template that governs it. Borrows
/// both; neither is owned here.
#[derive(Clone, Copy)]
pub struct DataRecord<'a> {
    pub data: &'a [u8],
    pub template: &'a Template,
}

impl<'a> DataRecord<'a> {
    pub fn new(data: &'a [u8], template: &'a Template) -> Self {
        DataRecord { data, template }
    }

    pub fn iter(&self) -> FieldCursor<'a> {
        FieldCursor {
            data: self.data,
            fields: &self.template.fields,
            field_idx: 0,
            offset: 0,
        }
    }

    pub fn find(&self, enterprise: u32, id: u16) -> Option<FieldView<'a>> {
        self.iter().find(|v| v.enterprise == enterprise && v.id == id)
    }
}

/// Walks a data record's fields in template order without ever mutating
/// the template itself, replacing the mutable-iterator-over-template
/// pattern spec §9 calls for retiring.
pub struct FieldCursor<'a> {
    data: &'a [u8],
    fields: &'a [FieldSpec],
    field_idx: usize,
    offset: usize,
}

impl<'a> Iterator for FieldCursor<'a> {
    type Item = FieldView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let spec = self.fields.get(self.field_idx)?;
        let len = spec.length as usize;
        if self.offset + len > self.data.len() {
            return None;
        }
        let view = FieldView {
            enterprise: spec.enterprise,
            id: spec.id,
            data: &self.data[self.offset..self.offset + len],
        };
        self.field_idx += 1;
        self.offset += len;
        Some(view)
    }
}
