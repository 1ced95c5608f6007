//! Builds one IPFIX message: header, sets, records, per spec §4.4.
//!
//! State machine: `Empty -> Initialized -> (Initialized | SetOpen)* ->
//! Built`; `build()` only returns to a fresh `Initialized` state once
//! `init()` is called again.

use core::convert::TryFrom;

use crate::error::{Error, Result};
use crate::host::{EnvelopedMessage, RecordDescriptor, SetDescriptor};
use crate::template::{MIN_DATA_SET_ID, OPTIONS_TEMPLATE_SET_ID, TEMPLATE_SET_ID};

pub const HEADER_SIZE: usize = 16;
pub const SET_HEADER_SIZE: usize = 4;
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;
const INITIAL_CAPACITY: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    Initialized,
    SetOpen { set_offset: usize, set_id: u16 },
    Built,
}

pub struct MessageBuilder {
    state: State,
    buf: Vec<u8>,
    sets: Vec<SetDescriptor>,
    records: Vec<RecordDescriptor>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        MessageBuilder {
            state: State::Empty,
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            sets: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= HEADER_SIZE
    }

    /// Allocates the buffer and writes the message header. Valid from
    /// `Empty` or `Built`.
    pub fn init(&mut self, export_time: u32, seq_num: u32, odid: u32) -> Result<()> {
        match self.state {
            State::Empty | State::Built => {}
            _ => return Err(Error::Invariant("init called while a message is in progress".into())),
        }

        self.buf.clear();
        self.buf.reserve(INITIAL_CAPACITY);
        self.sets.clear();
        self.records.clear();

        self.append_bytes(&10u16.to_be_bytes())?; // version
        self.append_bytes(&0u16.to_be_bytes())?; // length placeholder
        self.append_bytes(&export_time.to_be_bytes())?;
        self.append_bytes(&seq_num.to_be_bytes())?;
        self.append_bytes(&odid.to_be_bytes())?;

        self.state = State::Initialized;
        Ok(())
    }

    fn current_set_id(&self) -> Option<u16> {
        match self.state {
            State::SetOpen { set_id, .. } => Some(set_id),
            _ => None,
        }
    }

    fn close_set(&mut self) {
        if let State::SetOpen { set_offset, .. } = self.state {
            let set_len = (self.buf.len() - set_offset) as u16;
            self.buf[set_offset + 2..set_offset + 4].copy_from_slice(&set_len.to_be_bytes());
            self.state = State::Initialized;
        }
    }

    fn open_set(&mut self, id: u16) -> Result<()> {
        if id != TEMPLATE_SET_ID && id != OPTIONS_TEMPLATE_SET_ID && id < MIN_DATA_SET_ID {
            return Err(Error::Format(format!("invalid set id {}", id)));
        }
        self.close_set();
        let set_offset = self.buf.len();
        self.append_bytes(&id.to_be_bytes())?;
        self.append_bytes(&0u16.to_be_bytes())?; // length placeholder
        self.state = State::SetOpen { set_offset, set_id: id };
        Ok(())
    }

    /// Doubling-growth append, refusing to exceed the 65,535-byte cap.
    fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.buf.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(Error::Overflow);
        }
        if self.buf.capacity() < self.buf.len() + data.len() {
            let mut new_cap = self.buf.capacity().max(1);
            while new_cap < self.buf.len() + data.len() {
                new_cap *= 2;
            }
            self.buf.reserve(new_cap - self.buf.capacity());
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// True if appending `record_len` bytes under `template_id` would push
    /// the message past the cap, accounting for a possible new set header.
    pub fn would_overflow(&self, record_len: usize, template_id: u16) -> bool {
        let set_header_cost = if self.current_set_id() == Some(template_id) { 0 } else { SET_HEADER_SIZE };
        self.buf.len() + set_header_cost + record_len > MAX_MESSAGE_SIZE
    }

    /// Opens a new set if needed, then appends `bytes` as one record under
    /// `template_id`.
    pub fn add_record(&mut self, bytes: &[u8], template_id: u16) -> Result<()> {
        match self.state {
            State::Initialized | State::SetOpen { .. } => {}
            _ => return Err(Error::Invariant("add_record called before init".into())),
        }

        if self.would_overflow(bytes.len(), template_id) {
            return Err(Error::Overflow);
        }

        if self.current_set_id() != Some(template_id) {
            self.open_set(template_id)?;
        }

        let offset = self.buf.len();
        self.append_bytes(bytes)?;
        self.records.push(RecordDescriptor {
            offset,
            size: u16::try_from(bytes.len()).map_err(|_| Error::Invariant("record too large".into()))?,
            template_id,
        });

        if let State::SetOpen { set_offset, set_id } = self.state {
            if self.sets.last().map(|s| s.offset) != Some(set_offset) {
                self.sets.push(SetDescriptor { offset: set_offset, id: set_id });
            }
        }

        Ok(())
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    /// Closes any open set, back-patches the message length, and returns
    /// the finished envelope. The builder must be re-`init`ialized before
    /// it can build another message.
    pub fn build(mut self) -> Result<EnvelopedMessage> {
        self.close_set();
        let total_len = u16::try_from(self.buf.len()).map_err(|_| Error::Overflow)?;
        self.buf[2..4].copy_from_slice(&total_len.to_be_bytes());
        self.state = State::Built;

        Ok(EnvelopedMessage {
            bytes: self.buf,
            sets: self.sets,
            records: self.records,
        })
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
