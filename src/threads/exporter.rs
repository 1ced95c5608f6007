//! The downstream half of the channel split: receives finished IPFIX
//! messages from the pairing engine (running on the listener thread) and
//! re-emits them, mirroring this codebase's original listener/exporter
//! thread split but carrying finished envelopes instead of parsed flows.

use log::{debug, info, warn};
use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{Receiver, Sender};

use ipfix_biflow::error::{Error, Result};
use ipfix_biflow::host::{EnvelopedMessage, MessageSink, SessionEvent};

/// A [`MessageSink`] that hands finished envelopes off to the exporter
/// thread over a channel. Session events have nowhere further to go in
/// this standalone binary, so they're just logged inline.
pub struct ChannelSink {
    tx: Sender<EnvelopedMessage>,
}

impl ChannelSink {
    pub fn new(tx: Sender<EnvelopedMessage>) -> Self {
        ChannelSink { tx }
    }
}

impl MessageSink for ChannelSink {
    fn send_message(&mut self, message: EnvelopedMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::HostRejected("exporter thread is gone".into()))
    }

    fn send_session_event(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Open => info!("opened session intermediate:biflow"),
            SessionEvent::Close => info!("closed session intermediate:biflow"),
        }
        Ok(())
    }
}

/// Receives finished messages and, when a destination was configured on
/// the CLI, forwards each one verbatim as a UDP datagram; otherwise just
/// logs what would have been sent.
pub fn export(receiver: Receiver<EnvelopedMessage>, destination: Option<SocketAddr>) {
    let socket = destination.map(|addr| {
        let socket = UdpSocket::bind("0.0.0.0:0").expect("failed to bind export UDP socket");
        info!("forwarding biflow messages to {}", addr);
        (socket, addr)
    });

    loop {
        let message = match receiver.recv() {
            Ok(m) => m,
            Err(_) => {
                info!("listener thread is gone, exporter shutting down");
                return;
            }
        };

        debug!("emitting IPFIX message: {} bytes, {} records", message.bytes.len(), message.records.len());

        if let Some((socket, addr)) = &socket {
            if let Err(e) = socket.send_to(&message.bytes, addr) {
                warn!("failed to forward IPFIX message to {}: {}", addr, e);
            }
        }
    }
}
