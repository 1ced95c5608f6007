//! Allocates output template ids and memoizes uniflow-passthrough and
//! biflow templates, per spec §4.5.

use crate::error::Result;
use crate::host::TemplateManager;
use crate::template::{Template, TemplateFlags};
use crate::template_builder::TemplateBuilder;

const MIN_OUTPUT_ID: u16 = 256;

struct UniflowEntry {
    input: Template,
    output_id: u16,
}

#[derive(Clone)]
pub struct BiflowEntry {
    pub fwd_in_id: u16,
    pub rev_in_id: u16,
    pub output_id: u16,
}

pub struct TemplateRegistry {
    uniflow: Vec<UniflowEntry>,
    biflow: Vec<BiflowEntry>,
    next_id: u16,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        TemplateRegistry {
            uniflow: Vec::new(),
            biflow: Vec::new(),
            next_id: MIN_OUTPUT_ID,
        }
    }

    /// True when the *next* allocation would hand out `u16::MAX`. The
    /// caller must flush all cached records first so none of them
    /// reference an id about to be recycled by the wraparound.
    pub fn would_wrap(&self) -> bool {
        self.next_id == u16::MAX
    }

    fn alloc_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = if self.next_id == u16::MAX { MIN_OUTPUT_ID } else { self.next_id + 1 };
        id
    }

    /// Scans for a byte-identical input template; reuses its output id if
    /// found, else allocates a fresh one, registers a renumbered copy with
    /// the template manager, and remembers it.
    pub fn ensure_uniflow(&mut self, input: &Template, tmgr: &mut TemplateManager) -> Result<u16> {
        if let Some(entry) = self.uniflow.iter().find(|e| e.input.semantically_eq(input)) {
            return Ok(entry.output_id);
        }

        let output_id = self.alloc_id();
        let mut output_template = input.clone();
        output_template.id = output_id;
        tmgr.register(output_template)?;

        self.uniflow.push(UniflowEntry {
            input: input.clone(),
            output_id,
        });
        Ok(output_id)
    }

    pub fn find_biflow(&self, fwd_in_id: u16, rev_in_id: u16) -> Option<BiflowEntry> {
        self.biflow
            .iter()
            .find(|e| e.fwd_in_id == fwd_in_id && e.rev_in_id == rev_in_id)
            .cloned()
    }

    /// Parses and registers a newly built biflow template body, then
    /// memoizes it under the `(fwd_in_id, rev_in_id)` pair. On a parse
    /// failure, nothing is registered or memoized.
    pub fn create_biflow(
        &mut self,
        builder: &TemplateBuilder,
        fwd_in_id: u16,
        rev_in_id: u16,
        tmgr: &mut TemplateManager,
    ) -> Result<BiflowEntry> {
        let output_id = self.alloc_id();
        let body = builder.build(output_id);
        let flags = TemplateFlags {
            is_biflow: true,
            is_options: false,
        };
        let template = Template::parse(&body, flags)?;
        tmgr.register(template)?;

        let entry = BiflowEntry {
            fwd_in_id,
            rev_in_id,
            output_id,
        };
        self.biflow.push(entry.clone());
        Ok(entry)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
