//! Streaming IPFIX biflow converter: pairs unidirectional flow records
//! (uniflows) traveling in opposite directions into single bidirectional
//! records (biflows), re-emitting well-formed IPFIX messages.
//!
//! The pairing engine ([`pairing_engine::PairingEngine`]) is the library's
//! entry point; everything else here is either a component it's built from
//! (the content-addressed cache, time wheel, template registry, message
//! builder) or a stand-in for host-pipeline primitives this crate doesn't
//! own (`host`, `wire`).

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod clock;
pub mod config;
pub mod error;
pub mod flow_key;
pub mod host;
pub mod iana;
pub mod ie_registry;
pub mod ip_addr;
pub mod logger;
pub mod message_builder;
pub mod pairing_engine;
pub mod record_buffer;
pub mod record_builder;
pub mod template;
pub mod template_builder;
pub mod template_registry;
pub mod time_wheel;
pub mod wire;
