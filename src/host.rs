//! Minimal stand-ins for the host pipeline primitives spec §1 declares out
//! of scope: the template manager, the session-event channel, and IPFIX
//! envelope allocation. A production deployment plugs in the real
//! downstream library's equivalents; this module exists only so the
//! pairing engine is a complete, exercisable crate on its own.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::template::Template;

/// Owns every template this engine instance has registered, keyed by the
/// output id it was assigned. Stands in for the downstream template
/// manager the real plugin would hand templates off to. The real manager's
/// scoped, point-in-time snapshot view has no counterpart here: spec §5
/// makes the engine single-threaded, so there's no concurrent mutation for
/// a snapshot to guard against, and `get` reads the live table directly.
#[derive(Default)]
pub struct TemplateManager {
    templates: HashMap<u16, Arc<Template>>,
}

impl TemplateManager {
    pub fn new() -> Self {
        TemplateManager::default()
    }

    pub fn register(&mut self, template: Template) -> Result<Arc<Template>> {
        let id = template.id;
        let arc = Arc::new(template);
        self.templates.insert(id, arc.clone());
        Ok(arc)
    }

    pub fn get(&self, id: u16) -> Option<Arc<Template>> {
        self.templates.get(&id).cloned()
    }
}

/// Fired once when the engine's synthetic session is first needed, and
/// once more when the engine is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Open,
    Close,
}

/// One set's position within a finished message's byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct SetDescriptor {
    pub offset: usize,
    pub id: u16,
}

/// One record's position within a finished message's byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct RecordDescriptor {
    pub offset: usize,
    pub size: u16,
    pub template_id: u16,
}

/// A finished IPFIX message, ready to hand off to the host pipeline.
#[derive(Debug, Clone)]
pub struct EnvelopedMessage {
    pub bytes: Vec<u8>,
    pub sets: Vec<SetDescriptor>,
    pub records: Vec<RecordDescriptor>,
}

/// The downstream channel a finished message (or session event) is handed
/// to. The engine is generic over this so tests can substitute a
/// recording sink for a live transport.
pub trait MessageSink {
    fn send_message(&mut self, message: EnvelopedMessage) -> Result<()>;
    fn send_session_event(&mut self, event: SessionEvent) -> Result<()>;
}

/// A sink that simply records what it was handed, for tests.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Vec<EnvelopedMessage>,
    pub events: Vec<SessionEvent>,
}

impl MessageSink for RecordingSink {
    fn send_message(&mut self, message: EnvelopedMessage) -> Result<()> {
        self.messages.push(message);
        Ok(())
    }

    fn send_session_event(&mut self, event: SessionEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

/// A sink that always refuses, to exercise the "host pipeline refuses a
/// msg_pass" fatal path (spec §7).
pub struct RefusingSink;

impl MessageSink for RefusingSink {
    fn send_message(&mut self, _message: EnvelopedMessage) -> Result<()> {
        Err(Error::HostRejected("pipeline refused message".into()))
    }

    fn send_session_event(&mut self, _event: SessionEvent) -> Result<()> {
        Err(Error::HostRejected("pipeline refused session event".into()))
    }
}
