//! Carrier - Protocol
//!
//! Data model and wire codec for the envelope pipeline.
//!
//! # Overview
//!
//! This crate provides:
//! - The canonical envelope (`Envelope`, typed tags, tagged message
//!   variant) and the legacy v1 shapes with total conversion
//! - Subscription requests with shard ids and envelope filters
//! - The length-prefixed wire codec and async frame helpers shared by
//!   every surface (ingress, egress, query)
//! - Per-key counter aggregation used on both sides of the pipeline
//! - Transport setup: plain TCP or mutual TLS behind one stream type
//!
//! The wire format is a simple length-prefixed binary layout rather
//! than a Rust-specific serialization, so non-Rust peers can speak it.

pub mod counter;
pub mod envelope;
pub mod error;
pub mod request;
pub mod transport;
pub mod v1;
pub mod wire;

pub use counter::CounterAggregator;
pub use envelope::{
    Counter, Envelope, EnvelopeType, Event, Gauge, GaugeValue, Log, LogType, Message, TagValue,
    Timer,
};
pub use error::{ProtocolError, Result};
pub use request::{Filter, SubscriptionRequest};
pub use transport::{Stream, TlsPaths, client_tls, server_tls};
pub use v1::{LegacyEnvelope, LegacyEvent};
pub use wire::{ErrorCode, FrameReader, MAX_FRAME_SIZE, WireMessage, read_frame, write_frame};
