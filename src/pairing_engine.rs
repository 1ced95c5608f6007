//! Top-level state holder, per spec §4.7–§4.10: routes inbound records to
//! passthrough, caching, or biflow-merging, and drives expiry/flushing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flow_key::{self, FlowKey};
use crate::host::{MessageSink, SessionEvent, TemplateManager};
use crate::iana;
use crate::ie_registry;
use crate::message_builder::MessageBuilder;
use crate::record_buffer::RecordBuffer;
use crate::record_builder::RecordBuilder;
use crate::template::{DataRecord, FieldView, Template};
use crate::template_builder::TemplateBuilder;
use crate::template_registry::TemplateRegistry;
use crate::time_wheel::TimeWheel;
use crate::wire::ParsedRecord;

fn add_key_fields_to_template(key: &FlowKey, tb: &mut TemplateBuilder) {
    if key.dst_ip.is_ip6() {
        tb.append(iana::SOURCE_IPV6_ADDRESS, 16, 0);
    } else {
        tb.append(iana::SOURCE_IPV4_ADDRESS, 4, 0);
    }
    if key.src_ip.is_ip6() {
        tb.append(iana::DESTINATION_IPV6_ADDRESS, 16, 0);
    } else {
        tb.append(iana::DESTINATION_IPV4_ADDRESS, 4, 0);
    }
    if key.dst_port != 0 {
        tb.append(iana::SOURCE_TRANSPORT_PORT, 2, 0);
    }
    if key.src_port != 0 {
        tb.append(iana::DESTINATION_TRANSPORT_PORT, 2, 0);
    }
    tb.append(iana::PROTOCOL_IDENTIFIER, 1, 0);
}

/// "Reversed key" here is the key of the record being merged in (the newly
/// arrived half), used as-is: the cached forward record's original
/// direction becomes the biflow record's nominal source side.
fn add_key_fields_to_record(key: &FlowKey, rb: &mut RecordBuilder) {
    rb.append_ip(&key.dst_ip);
    rb.append_ip(&key.src_ip);
    if key.dst_port != 0 {
        rb.append_uint(key.dst_port as u64, 2);
    }
    if key.src_port != 0 {
        rb.append_uint(key.src_port as u64, 2);
    }
    rb.append_uint(key.protocol as u64, 1);
}

/// Applies the field admissibility rules of spec §4.6 to one field,
/// appending it to the output record (and, while the biflow template is
/// still being built, to the template) unless it's dropped.
fn add_field(
    view: &FieldView,
    is_reversed: bool,
    ignore_missing_reverse: bool,
    rec: &mut RecordBuilder,
    tmplt: Option<&mut TemplateBuilder>,
) {
    if iana::is_key_field(view.enterprise, view.id) {
        return;
    }
    if is_reversed && iana::is_non_reversible_field(view.enterprise, view.id) {
        return;
    }
    if let Some(def) = ie_registry::lookup(view.enterprise, view.id) {
        if iana::is_ignored_type(def.data_type) {
            return;
        }
    }

    let missing_reverse_def = is_reversed
        && view.enterprise != iana::IANA_PEN
        && ie_registry::reverse_definition(view.enterprise, view.id).is_none();

    if missing_reverse_def && ignore_missing_reverse {
        return;
    }

    rec.append_raw(view);

    if let Some(tb) = tmplt {
        if !is_reversed || missing_reverse_def {
            tb.append(view.id, view.length(), view.enterprise);
        } else if view.enterprise != iana::IANA_PEN {
            let reverse_id = ie_registry::reverse_definition(view.enterprise, view.id)
                .expect("missing_reverse_def is false, so a reverse definition exists");
            tb.append(reverse_id, view.length(), view.enterprise);
        } else {
            tb.append(view.id, view.length(), iana::IANA_PEN_REVERSED);
        }
    }
}

pub struct PairingEngine<S: MessageSink, C: Clock> {
    config: Config,
    cache: HashMap<FlowKey, RecordBuffer>,
    wheel: TimeWheel,
    templates: TemplateRegistry,
    tmgr: TemplateManager,
    builder: MessageBuilder,
    sink: S,
    clock: C,
    seq_num: u32,
    last_flush_ts: u64,
    session_open: bool,
}

impl<S: MessageSink, C: Clock> PairingEngine<S, C> {
    pub fn new(config: Config, sink: S, clock: C) -> Result<Self> {
        let mut builder = MessageBuilder::new();
        let export_time = clock.wall_secs();
        builder.init(export_time, 0, config.odid)?;
        let last_flush_ts = clock.monotonic_secs();

        Ok(PairingEngine {
            config,
            cache: HashMap::new(),
            wheel: TimeWheel::new(),
            templates: TemplateRegistry::new(),
            tmgr: TemplateManager::new(),
            builder,
            sink,
            clock,
            seq_num: 0,
            last_flush_ts,
            session_open: false,
        })
    }

    /// Iterates one inbound message's records in source order, then sweeps
    /// expired cache entries and checks the message flush timer.
    pub fn process_message(&mut self, records: &[ParsedRecord]) -> Result<()> {
        for rec in records {
            self.process_record(&rec.bytes, &rec.template)?;
        }
        self.send_expired()
    }

    fn ensure_session_open(&mut self) -> Result<()> {
        if !self.session_open {
            self.sink.send_session_event(SessionEvent::Open)?;
            self.session_open = true;
        }
        Ok(())
    }

    fn process_record(&mut self, bytes: &[u8], template: &Arc<Template>) -> Result<()> {
        if template.flags.is_biflow || template.flags.is_options {
            log::debug!("passthrough: record governed by a biflow or options template {}", template.id);
            return self.passthrough(bytes, template);
        }

        let now = self.clock.monotonic_secs();
        let data_rec = DataRecord::new(bytes, template);
        let key = match flow_key::extract_key(&data_rec, self.config.pair_missing_ports, now) {
            Ok(k) => k,
            Err(e) => {
                log::debug!("passthrough: key extraction failed: {}", e);
                return self.passthrough(bytes, template);
            }
        };

        if self.templates.would_wrap() {
            log::warn!("template id space nearly exhausted, flushing cache before continuing");
            self.flush_cache_as_passthrough()?;
        }
        let output_id = self.templates.ensure_uniflow(template, &mut self.tmgr)?;
        let new_buf = RecordBuffer::new(bytes.to_vec(), output_id, now);

        let reverse_key = key.reverse();
        if let Some(fwd) = self.cache.remove(&reverse_key) {
            if let Err(e) = self.emit_biflow(&key, &fwd, &new_buf) {
                log::warn!("biflow template construction failed, passthrough instead: {}", e);
                self.emit_record_bytes(new_buf.bytes, new_buf.output_template_id)?;
            }
            return Ok(());
        }

        let superseded = self.cache.insert(key, new_buf);
        self.wheel.add(key);
        if let Some(old) = superseded {
            log::debug!("cache entry superseded before its counterpart arrived, passthrough stale half");
            self.emit_record_bytes(old.bytes, old.output_template_id)?;
        }
        Ok(())
    }

    fn emit_biflow(&mut self, new_key: &FlowKey, fwd: &RecordBuffer, rev: &RecordBuffer) -> Result<()> {
        let fwd_tmplt = self
            .tmgr
            .get(fwd.output_template_id)
            .ok_or_else(|| Error::Invariant("missing forward uniflow template".into()))?;
        let rev_tmplt = self
            .tmgr
            .get(rev.output_template_id)
            .ok_or_else(|| Error::Invariant("missing reverse uniflow template".into()))?;

        let existing = self.templates.find_biflow(fwd.output_template_id, rev.output_template_id);
        let building_template = existing.is_none();

        let mut rec_builder = RecordBuilder::new();
        let mut tmplt_builder = TemplateBuilder::new();

        add_key_fields_to_record(new_key, &mut rec_builder);
        if building_template {
            add_key_fields_to_template(new_key, &mut tmplt_builder);
        }

        let fwd_rec = DataRecord::new(&fwd.bytes, &fwd_tmplt);
        for view in fwd_rec.iter() {
            let tb = if building_template { Some(&mut tmplt_builder) } else { None };
            add_field(&view, false, self.config.ignore_missing_reverse, &mut rec_builder, tb);
        }

        let rev_rec = DataRecord::new(&rev.bytes, &rev_tmplt);
        for view in rev_rec.iter() {
            let tb = if building_template { Some(&mut tmplt_builder) } else { None };
            add_field(&view, true, self.config.ignore_missing_reverse, &mut rec_builder, tb);
        }

        let output_id = match existing {
            Some(entry) => entry.output_id,
            None => {
                if self.templates.would_wrap() {
                    self.flush_cache_as_passthrough()?;
                }
                self.templates
                    .create_biflow(&tmplt_builder, fwd.output_template_id, rev.output_template_id, &mut self.tmgr)?
                    .output_id
            }
        };

        self.emit_record_bytes(rec_builder.front().to_vec(), output_id)
    }

    fn passthrough(&mut self, bytes: &[u8], template: &Arc<Template>) -> Result<()> {
        if self.templates.would_wrap() {
            self.flush_cache_as_passthrough()?;
        }
        let output_id = self.templates.ensure_uniflow(template, &mut self.tmgr)?;
        self.emit_record_bytes(bytes.to_vec(), output_id)
    }

    fn emit_record_bytes(&mut self, bytes: Vec<u8>, template_id: u16) -> Result<()> {
        self.ensure_session_open()?;
        if self.builder.would_overflow(bytes.len(), template_id) {
            self.flush_message()?;
        }
        self.builder.add_record(&bytes, template_id)?;
        self.seq_num = self.seq_num.wrapping_add(1);
        Ok(())
    }

    fn flush_message(&mut self) -> Result<()> {
        self.last_flush_ts = self.clock.monotonic_secs();
        if !self.builder.has_records() {
            return Ok(());
        }
        let finished = std::mem::replace(&mut self.builder, MessageBuilder::new());
        let envelope = finished.build()?;
        self.sink.send_message(envelope)?;
        let export_time = self.clock.wall_secs();
        self.builder.init(export_time, self.seq_num, self.config.odid)?;
        Ok(())
    }

    fn check_timeout(&mut self) -> Result<()> {
        let timeout = self.config.timeout_msg as u64;
        let now = self.clock.monotonic_secs();
        let expired = timeout == 0 || now.saturating_sub(self.last_flush_ts) > timeout;
        if expired {
            self.flush_message()?;
        }
        Ok(())
    }

    fn send_expired(&mut self) -> Result<()> {
        let now = self.clock.monotonic_secs();
        let expired_keys = self.wheel.collect_expired(now, self.config.timeout_cache as u64);
        for k in expired_keys {
            let is_current = self.cache.get(&k).map(|e| e.arrival_ts == k.arrival_ts).unwrap_or(false);
            if is_current {
                let entry = self.cache.remove(&k).unwrap();
                self.emit_record_bytes(entry.bytes, entry.output_template_id)?;
            }
        }
        self.check_timeout()
    }

    fn flush_cache_as_passthrough(&mut self) -> Result<()> {
        let entries: Vec<RecordBuffer> = self.cache.drain().map(|(_, v)| v).collect();
        for entry in entries {
            self.emit_record_bytes(entry.bytes, entry.output_template_id)?;
        }
        Ok(())
    }

    /// Drains the cache, flushes the final message, and closes the
    /// synthetic session, per spec §4.10's destroy-time policy. Returns the
    /// sink so callers (and tests) can inspect what it was handed.
    pub fn shutdown(mut self) -> Result<S> {
        self.flush_cache_as_passthrough()?;
        self.flush_message()?;
        if self.session_open {
            self.sink.send_session_event(SessionEvent::Close)?;
        }
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::host::RecordingSink;
    use crate::iana;
    use crate::ip_addr::IpAddr;
    use crate::template::{FieldSpec, TemplateFlags};
    use hex_literal::hex;

    fn config(pair_missing_ports: bool, ignore_missing_reverse: bool) -> Config {
        Config {
            odid: 7,
            timeout_cache: 5,
            timeout_msg: 10,
            ignore_missing_reverse,
            pair_missing_ports,
        }
    }

    fn tcp_template(id: u16, extra: &[(u16, u16)]) -> Arc<Template> {
        let mut fields = vec![
            FieldSpec { enterprise: 0, id: iana::SOURCE_TRANSPORT_PORT, length: 2 },
            FieldSpec { enterprise: 0, id: iana::DESTINATION_TRANSPORT_PORT, length: 2 },
            FieldSpec { enterprise: 0, id: iana::PROTOCOL_IDENTIFIER, length: 1 },
            FieldSpec { enterprise: 0, id: iana::SOURCE_IPV4_ADDRESS, length: 4 },
            FieldSpec { enterprise: 0, id: iana::DESTINATION_IPV4_ADDRESS, length: 4 },
        ];
        for (id, len) in extra {
            fields.push(FieldSpec { enterprise: 0, id: *id, length: *len });
        }
        Arc::new(Template::new(id, fields, TemplateFlags::default()))
    }

    fn record_bytes(src_port: u16, dst_port: u16, proto: u8, src: [u8; 4], dst: [u8; 4], extra: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&src_port.to_be_bytes());
        buf.extend_from_slice(&dst_port.to_be_bytes());
        buf.push(proto);
        buf.extend_from_slice(&src);
        buf.extend_from_slice(&dst);
        buf.extend_from_slice(extra);
        buf
    }

    fn record_header(bytes: &[u8]) -> (u16, u32) {
        // (message length, sequence number) read straight out of the 16-byte header.
        let length = u16::from_be_bytes([bytes[2], bytes[3]]);
        let seq = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        (length, seq)
    }

    /// S1: simple IPv4 TCP pair. Checks the exact merged record body:
    /// re-emitted key fields (new arrival's key, per §4.6), then the
    /// forward side's non-key field, then the reverse side's non-key
    /// field under the reverse PEN.
    #[test]
    fn s1_simple_pair_produces_one_biflow_record() {
        let clock = TestClock::new(100);
        let sink = RecordingSink::default();
        let mut engine = PairingEngine::new(config(false, false), sink, clock).unwrap();

        let tmplt = tcp_template(256, &[(iana::OCTET_DELTA_COUNT, 4)]);
        let r1 = record_bytes(1000, 80, 6, [10, 0, 0, 1], [10, 0, 0, 2], &100u32.to_be_bytes());
        engine
            .process_message(&[ParsedRecord { bytes: r1, template: tmplt.clone() }])
            .unwrap();

        let r2 = record_bytes(80, 1000, 6, [10, 0, 0, 2], [10, 0, 0, 1], &200u32.to_be_bytes());
        engine
            .process_message(&[ParsedRecord { bytes: r2, template: tmplt }])
            .unwrap();

        let sink = engine.shutdown().unwrap();
        assert_eq!(sink.messages.len(), 1, "exactly one message, no stray passthroughs");
        let msg = &sink.messages[0];
        assert_eq!(msg.records.len(), 1, "A and B merge into a single record, neither appears standalone");

        let rec = &msg.records[0];
        assert_ne!(rec.template_id, 256, "biflow record must use a freshly built output template");
        let body = &msg.bytes[rec.offset..rec.offset + rec.size as usize];
        let expected = [
            hex!("0a000001").as_slice(), // source ip 10.0.0.1
            &hex!("0a000002"),           // destination ip 10.0.0.2
            &1000u16.to_be_bytes(),      // source port
            &80u16.to_be_bytes(),        // destination port
            &[6],                        // protocol
            &100u32.to_be_bytes(),       // forward octetDeltaCount, verbatim
            &200u32.to_be_bytes(),       // reverse octetDeltaCount, reverse-PEN remapped
        ]
        .concat();
        assert_eq!(body, expected.as_slice());

        assert_eq!(msg.sets.len(), 1);
        assert!(msg.sets[0].id >= 256, "data sets are always keyed by a template id >= 256");
    }

    /// S2: no counterpart arrives before `timeout_cache`; a later record
    /// triggers a sweep that flushes the stale uniflow as a passthrough,
    /// before the unrelated triggering record.
    #[test]
    fn s2_expiry_flushes_stale_uniflow_as_passthrough() {
        let clock = TestClock::new(100);
        let sink = RecordingSink::default();
        let mut engine = PairingEngine::new(config(false, false), sink, clock.clone()).unwrap();

        let tmplt = tcp_template(256, &[]);
        let r1 = record_bytes(1000, 80, 6, [10, 0, 0, 1], [10, 0, 0, 2], &[]);
        engine
            .process_message(&[ParsedRecord { bytes: r1.clone(), template: tmplt.clone() }])
            .unwrap();

        // past t0(100) + timeout_cache(5) + 2, so the sweep after the next
        // message picks R1 up.
        clock.set(107);
        let r3 = record_bytes(2000, 443, 6, [10, 0, 0, 3], [10, 0, 0, 4], &[]);
        engine
            .process_message(&[ParsedRecord { bytes: r3.clone(), template: tmplt }])
            .unwrap();

        let sink = engine.shutdown().unwrap();
        assert_eq!(sink.messages.len(), 1);
        let msg = &sink.messages[0];
        assert_eq!(msg.records.len(), 2, "R1 (expired passthrough) and R3 (fresh, still cached until shutdown) both land");

        // R1's passthrough must be emitted (and thus sequenced) before R3's
        // own processing, since the sweep runs at the end of R3's message.
        let first_body = &msg.bytes[msg.records[0].offset..msg.records[0].offset + msg.records[0].size as usize];
        assert_eq!(first_body, r1.as_slice(), "passthrough carries the original body unchanged");
        let second_body = &msg.bytes[msg.records[1].offset..msg.records[1].offset + msg.records[1].size as usize];
        assert_eq!(second_body, r3.as_slice(), "R3 never paired, flushed as passthrough at shutdown");
    }

    /// S3: missing ports allowed. Both halves arrive without transport
    /// ports; the merged record and its template carry no port fields.
    #[test]
    fn s3_missing_reverse_port_allowed_omits_port_fields() {
        let clock = TestClock::new(100);
        let sink = RecordingSink::default();
        let mut engine = PairingEngine::new(config(true, false), sink, clock).unwrap();

        let fields = vec![
            FieldSpec { enterprise: 0, id: iana::PROTOCOL_IDENTIFIER, length: 1 },
            FieldSpec { enterprise: 0, id: iana::SOURCE_IPV4_ADDRESS, length: 4 },
            FieldSpec { enterprise: 0, id: iana::DESTINATION_IPV4_ADDRESS, length: 4 },
        ];
        let tmplt = Arc::new(Template::new(300, fields, TemplateFlags::default()));

        let mut r1 = vec![17u8];
        r1.extend_from_slice(&[10, 0, 0, 1]);
        r1.extend_from_slice(&[10, 0, 0, 2]);
        engine
            .process_message(&[ParsedRecord { bytes: r1, template: tmplt.clone() }])
            .unwrap();

        let mut r2 = vec![17u8];
        r2.extend_from_slice(&[10, 0, 0, 2]);
        r2.extend_from_slice(&[10, 0, 0, 1]);
        engine
            .process_message(&[ParsedRecord { bytes: r2, template: tmplt }])
            .unwrap();

        let sink = engine.shutdown().unwrap();
        assert_eq!(sink.messages.len(), 1);
        let msg = &sink.messages[0];
        assert_eq!(msg.records.len(), 1);
        let rec = &msg.records[0];
        let body = &msg.bytes[rec.offset..rec.offset + rec.size as usize];
        // source ip (4) + destination ip (4) + protocol (1), no port fields.
        assert_eq!(body.len(), 9);
        assert_eq!(&body[0..4], &[10, 0, 0, 1]);
        assert_eq!(&body[4..8], &[10, 0, 0, 2]);
        assert_eq!(body[8], 17);
    }

    /// S4: an unsupported list-typed field is dropped from both sides,
    /// same as if it had never been in either record.
    #[test]
    fn s4_unsupported_list_field_is_dropped_from_both_sides() {
        let clock = TestClock::new(100);
        let sink = RecordingSink::default();
        let mut engine = PairingEngine::new(config(false, false), sink, clock).unwrap();

        let tmplt = tcp_template(256, &[(iana::SUB_TEMPLATE_LIST, 4)]);
        let r1 = record_bytes(1000, 80, 6, [10, 0, 0, 1], [10, 0, 0, 2], &[0xde, 0xad, 0xbe, 0xef]);
        engine
            .process_message(&[ParsedRecord { bytes: r1, template: tmplt.clone() }])
            .unwrap();
        let r2 = record_bytes(80, 1000, 6, [10, 0, 0, 2], [10, 0, 0, 1], &[0xfe, 0xed, 0xfa, 0xce]);
        engine
            .process_message(&[ParsedRecord { bytes: r2, template: tmplt }])
            .unwrap();

        let sink = engine.shutdown().unwrap();
        let msg = &sink.messages[0];
        let rec = &msg.records[0];
        // source ip + destination ip + source port + destination port + protocol, nothing else.
        assert_eq!(rec.size as usize, 4 + 4 + 2 + 2 + 1);
    }

    /// S5: a record whose template is already biflow-flagged bypasses the
    /// cache entirely and is emitted verbatim.
    #[test]
    fn s5_biflow_flagged_input_passes_through_untouched() {
        let clock = TestClock::new(100);
        let sink = RecordingSink::default();
        let mut engine = PairingEngine::new(config(false, false), sink, clock).unwrap();

        let mut tmplt = tcp_template(500, &[]);
        Arc::get_mut(&mut tmplt).unwrap().flags.is_biflow = true;

        let bytes = record_bytes(1000, 80, 6, [10, 0, 0, 1], [10, 0, 0, 2], &[]);
        engine
            .process_message(&[ParsedRecord { bytes: bytes.clone(), template: tmplt }])
            .unwrap();

        let sink = engine.shutdown().unwrap();
        assert_eq!(sink.messages.len(), 1);
        let msg = &sink.messages[0];
        assert_eq!(msg.records.len(), 1);
        let rec = &msg.records[0];
        assert_eq!(&msg.bytes[rec.offset..rec.offset + rec.size as usize], bytes.as_slice());
    }

    /// S6 (scaled down for test speed; the underlying overflow/sequencing
    /// behavior doesn't depend on record count): many passthrough records
    /// under one template roll over into several messages, each within the
    /// 65,535-byte cap, with contiguous sequence numbers across messages.
    #[test]
    fn s6_message_rollover_keeps_sequence_numbers_contiguous() {
        let clock = TestClock::new(100);
        let sink = RecordingSink::default();
        let mut engine = PairingEngine::new(config(false, false), sink, clock).unwrap();

        let mut tmplt = tcp_template(900, &[(iana::PADDING_OCTETS, 30)]);
        Arc::get_mut(&mut tmplt).unwrap().flags.is_biflow = true; // force immediate passthrough

        let record = record_bytes(1, 2, 6, [10, 0, 0, 1], [10, 0, 0, 2], &[0u8; 30]);
        let batch: Vec<ParsedRecord> =
            (0..3000).map(|_| ParsedRecord { bytes: record.clone(), template: tmplt.clone() }).collect();
        engine.process_message(&batch).unwrap();

        let sink = engine.shutdown().unwrap();
        assert!(sink.messages.len() >= 2, "3000 records of ~40 bytes must roll over past one message");

        let total_records: usize = sink.messages.iter().map(|m| m.records.len()).sum();
        assert_eq!(total_records, 3000);

        let mut expected_seq = 0u32;
        for msg in &sink.messages {
            assert!(msg.bytes.len() <= 65_535);
            let (length, seq) = record_header(&msg.bytes);
            assert_eq!(length as usize, msg.bytes.len());
            assert_eq!(seq, expected_seq, "sequence numbers form 0, N1, N1+N2, ...");
            expected_seq += msg.records.len() as u32;
        }
    }

    #[test]
    fn reverse_key_lookup_pairs_opposite_direction_records() {
        let a = FlowKey {
            src_ip: IpAddr::from_v4_octets([10, 0, 0, 1]),
            dst_ip: IpAddr::from_v4_octets([10, 0, 0, 2]),
            src_port: 1000,
            dst_port: 80,
            protocol: 6,
            arrival_ts: 1,
        };
        let b = FlowKey {
            src_ip: IpAddr::from_v4_octets([10, 0, 0, 2]),
            dst_ip: IpAddr::from_v4_octets([10, 0, 0, 1]),
            src_port: 80,
            dst_port: 1000,
            protocol: 6,
            arrival_ts: 2,
        };
        assert_eq!(a.reverse(), b);
    }
}
