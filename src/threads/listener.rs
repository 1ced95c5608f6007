//! Inbound UDP listener: binds a socket, parses each datagram into
//! templates and data records, and drives them through a [`PairingEngine`]
//! running on this same thread — the single-threaded-invocation discipline
//! spec §5 requires. Finished messages leave over a channel to the
//! exporter thread.

use log::{error, info, trace, warn};
use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::Sender;

use ipfix_biflow::clock::SystemClock;
use ipfix_biflow::config::Config;
use ipfix_biflow::error::Error;
use ipfix_biflow::host::EnvelopedMessage;
use ipfix_biflow::pairing_engine::PairingEngine;
use ipfix_biflow::wire::{self, InboundTemplates};

use super::exporter::ChannelSink;

/// Largest datagram a UDP socket can deliver; IPFIX messages are capped
/// at the same 65,535-byte ceiling.
const MAX_DATAGRAM: usize = u16::MAX as usize;

pub fn listen(addr: SocketAddr, config: Config, sender: Sender<EnvelopedMessage>) {
    let socket = UdpSocket::bind(addr).unwrap_or_else(|e| panic!("failed to bind UDP socket to {}: {}", addr, e));
    info!("listening for IPFIX datagrams on {}", addr);

    let sink = ChannelSink::new(sender);
    let clock = SystemClock::default();
    let mut engine = PairingEngine::new(config, sink, clock).expect("failed to initialize the pairing engine");
    let mut templates = InboundTemplates::new();

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) => {
                error!("failed to receive a UDP datagram: {}", e);
                continue;
            }
        };
        trace!("received {} bytes from {}", len, from);

        let parsed = match wire::parse_message(&buf[..len], &mut templates) {
            Ok(p) => p,
            Err(e) => {
                warn!("dropping malformed IPFIX message from {}: {}", from, e);
                continue;
            }
        };

        if let Err(e) = engine.process_message(&parsed.records) {
            match e {
                Error::Format(_) => warn!("record from {} dropped: {}", from, e),
                fatal => {
                    error!("fatal pairing engine error, shutting down the listener: {}", fatal);
                    return;
                }
            }
        }
    }
}
