//! Wire codec for the ingress, egress, and query surfaces
//!
//! All messages travel as length-prefixed frames:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────┐
//! │ 4 bytes      │ 1 byte       │ N-1 bytes            │
//! │ length (BE)  │ message type │ payload              │
//! └──────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! # Message Types
//!
//! Ingress (producer → aggregator):
//! - `Send` (0x01): one legacy v1 envelope
//! - `SendBatch` (0x02): a batch of canonical envelopes
//!
//! Egress (subscriber ↔ server):
//! - `Subscribe` (0x10): subscription request with shard and filter
//! - `Envelope` (0x11): one canonical envelope
//! - `EnvelopeBatch` (0x12): grouped envelopes for throughput
//! - `Error` (0x13): terminal status with an error code
//!
//! Query:
//! - `ContainerMetrics` (0x20): request by source id
//! - `ContainerMetricsReply` (0x21): retained envelopes

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::envelope::{
    Counter, Envelope, EnvelopeType, Event, Gauge, GaugeValue, Log, LogType, Message, TagValue,
    Timer,
};
use crate::error::{ProtocolError, Result};
use crate::request::{Filter, SubscriptionRequest};
use crate::v1::{LegacyEnvelope, LegacyEvent};

/// Maximum frame size (16MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Message type discriminants
const MSG_SEND: u8 = 0x01;
const MSG_SEND_BATCH: u8 = 0x02;
const MSG_SUBSCRIBE: u8 = 0x10;
const MSG_ENVELOPE: u8 = 0x11;
const MSG_ENVELOPE_BATCH: u8 = 0x12;
const MSG_ERROR: u8 = 0x13;
const MSG_CONTAINER_METRICS: u8 = 0x20;
const MSG_CONTAINER_METRICS_REPLY: u8 = 0x21;

/// Terminal status codes carried by `Error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Permanent request error, never retried
    InvalidArgument,
    /// Transient condition; the peer is expected to reconnect
    Unavailable,
    /// The stream terminated mid-delivery
    UnexpectedEof,
    /// Anything else
    Internal,
}

impl ErrorCode {
    fn to_u8(self) -> u8 {
        match self {
            ErrorCode::InvalidArgument => 1,
            ErrorCode::Unavailable => 2,
            ErrorCode::UnexpectedEof => 3,
            ErrorCode::Internal => 4,
        }
    }

    fn try_from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(ErrorCode::InvalidArgument),
            2 => Ok(ErrorCode::Unavailable),
            3 => Ok(ErrorCode::UnexpectedEof),
            4 => Ok(ErrorCode::Internal),
            _ => Err(ProtocolError::Malformed(format!(
                "unknown error code: {v}"
            ))),
        }
    }
}

/// Messages exchanged on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Producer → aggregator: one legacy envelope
    Send(LegacyEnvelope),
    /// Producer → aggregator: batch of canonical envelopes
    SendBatch(Vec<Envelope>),
    /// Subscriber → server: subscription request
    Subscribe(SubscriptionRequest),
    /// Server → subscriber: one envelope
    Envelope(Envelope),
    /// Server → subscriber: grouped envelopes
    EnvelopeBatch(Vec<Envelope>),
    /// Server → peer: terminal status
    Error { code: ErrorCode, message: String },
    /// Client → server: container metrics by source id, with the
    /// caller's remaining deadline so upstream calls can inherit it
    ContainerMetrics { source_id: String, deadline_ms: u64 },
    /// Server → client: retained container metric envelopes
    ContainerMetricsReply(Vec<Envelope>),
}

impl WireMessage {
    /// Encode message to bytes with length prefix
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        // Reserve space for length prefix (filled in at end)
        buf.put_u32(0);

        match self {
            WireMessage::Send(envelope) => {
                buf.put_u8(MSG_SEND);
                encode_legacy_envelope(envelope, &mut buf);
            }
            WireMessage::SendBatch(envelopes) => {
                buf.put_u8(MSG_SEND_BATCH);
                encode_envelope_vec(envelopes, &mut buf);
            }
            WireMessage::Subscribe(request) => {
                buf.put_u8(MSG_SUBSCRIBE);
                encode_request(request, &mut buf);
            }
            WireMessage::Envelope(envelope) => {
                buf.put_u8(MSG_ENVELOPE);
                encode_envelope(envelope, &mut buf);
            }
            WireMessage::EnvelopeBatch(envelopes) => {
                buf.put_u8(MSG_ENVELOPE_BATCH);
                encode_envelope_vec(envelopes, &mut buf);
            }
            WireMessage::Error { code, message } => {
                buf.put_u8(MSG_ERROR);
                buf.put_u8(code.to_u8());
                encode_string(message, &mut buf);
            }
            WireMessage::ContainerMetrics {
                source_id,
                deadline_ms,
            } => {
                buf.put_u8(MSG_CONTAINER_METRICS);
                encode_string(source_id, &mut buf);
                buf.put_u64(*deadline_ms);
            }
            WireMessage::ContainerMetricsReply(envelopes) => {
                buf.put_u8(MSG_CONTAINER_METRICS_REPLY);
                encode_envelope_vec(envelopes, &mut buf);
            }
        }

        // Write length prefix (excluding the 4-byte length field itself)
        let len = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());

        buf.freeze()
    }

    /// Decode message from bytes (without length prefix)
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.is_empty() {
            return Err(ProtocolError::Malformed("empty message".into()));
        }

        let msg_type = buf.get_u8();

        match msg_type {
            MSG_SEND => Ok(WireMessage::Send(decode_legacy_envelope(&mut buf)?)),
            MSG_SEND_BATCH => Ok(WireMessage::SendBatch(decode_envelope_vec(&mut buf)?)),
            MSG_SUBSCRIBE => Ok(WireMessage::Subscribe(decode_request(&mut buf)?)),
            MSG_ENVELOPE => Ok(WireMessage::Envelope(decode_envelope(&mut buf)?)),
            MSG_ENVELOPE_BATCH => Ok(WireMessage::EnvelopeBatch(decode_envelope_vec(&mut buf)?)),
            MSG_ERROR => {
                if buf.remaining() < 1 {
                    return Err(ProtocolError::Malformed("truncated error".into()));
                }
                let code = ErrorCode::try_from_u8(buf.get_u8())?;
                let message = decode_string(&mut buf)?;
                Ok(WireMessage::Error { code, message })
            }
            MSG_CONTAINER_METRICS => {
                let source_id = decode_string(&mut buf)?;
                if buf.remaining() < 8 {
                    return Err(ProtocolError::Malformed("truncated deadline".into()));
                }
                Ok(WireMessage::ContainerMetrics {
                    source_id,
                    deadline_ms: buf.get_u64(),
                })
            }
            MSG_CONTAINER_METRICS_REPLY => Ok(WireMessage::ContainerMetricsReply(
                decode_envelope_vec(&mut buf)?,
            )),
            _ => Err(ProtocolError::Malformed(format!(
                "unknown message type: {msg_type}"
            ))),
        }
    }
}

/// Read one frame from the stream
///
/// Returns `Ok(None)` on a clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<WireMessage>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    WireMessage::decode(Bytes::from(body)).map(Some)
}

/// Write one frame to the stream
pub async fn write_frame<W>(writer: &mut W, message: &WireMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&message.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Buffered frame reader safe to use inside `select!`
///
/// `read_frame` loses partially-read bytes when its future is dropped,
/// which corrupts framing in loops that race a read against timers or
/// cancellation. This reader accumulates into its own buffer with
/// cancel-safe `read_buf` calls, so a dropped call leaves the partial
/// frame intact for the next one.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Read the next frame; `Ok(None)` on clean EOF at a frame boundary
    pub async fn read<R>(&mut self, reader: &mut R) -> Result<Option<WireMessage>>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(message) = self.try_decode()? {
                return Ok(Some(message));
            }
            let n = reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::Malformed(
                    "connection closed mid-frame".into(),
                ));
            }
        }
    }

    fn try_decode(&mut self) -> Result<Option<WireMessage>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                limit: MAX_FRAME_SIZE,
            });
        }
        let total = 4 + len as usize;
        if self.buf.len() < total {
            self.buf.reserve(total - self.buf.len());
            return Ok(None);
        }
        self.buf.advance(4);
        let body = self.buf.split_to(len as usize).freeze();
        WireMessage::decode(body).map(Some)
    }
}

// ============================================================================
// Envelope codec
// ============================================================================

fn encode_envelope(envelope: &Envelope, buf: &mut BytesMut) {
    encode_string(&envelope.source_id, buf);
    encode_string(&envelope.instance_id, buf);
    buf.put_i64(envelope.timestamp);

    buf.put_u32(envelope.tags.len() as u32);
    for (key, value) in &envelope.tags {
        encode_string(key, buf);
        encode_tag_value(value, buf);
    }

    match &envelope.message {
        Message::Log(log) => {
            buf.put_u8(EnvelopeType::Log.to_u8());
            buf.put_u8(match log.log_type {
                LogType::Out => 0,
                LogType::Err => 1,
            });
            encode_bytes(&log.payload, buf);
        }
        Message::Counter(counter) => {
            buf.put_u8(EnvelopeType::Counter.to_u8());
            encode_string(&counter.name, buf);
            buf.put_u64(counter.delta);
        }
        Message::Gauge(gauge) => {
            buf.put_u8(EnvelopeType::Gauge.to_u8());
            buf.put_u32(gauge.metrics.len() as u32);
            for (name, value) in &gauge.metrics {
                encode_string(name, buf);
                encode_string(&value.unit, buf);
                buf.put_f64(value.value);
            }
        }
        Message::Timer(timer) => {
            buf.put_u8(EnvelopeType::Timer.to_u8());
            encode_string(&timer.name, buf);
            buf.put_i64(timer.start);
            buf.put_i64(timer.stop);
        }
        Message::Event(event) => {
            buf.put_u8(EnvelopeType::Event.to_u8());
            encode_string(&event.title, buf);
            encode_string(&event.body, buf);
        }
    }
}

fn decode_envelope(buf: &mut Bytes) -> Result<Envelope> {
    let source_id = decode_string(buf)?;
    let instance_id = decode_string(buf)?;

    if buf.remaining() < 8 {
        return Err(ProtocolError::Malformed("truncated timestamp".into()));
    }
    let timestamp = buf.get_i64();

    if buf.remaining() < 4 {
        return Err(ProtocolError::Malformed("truncated tag count".into()));
    }
    let tag_count = buf.get_u32() as usize;
    let mut tags = std::collections::BTreeMap::new();
    for _ in 0..tag_count {
        let key = decode_string(buf)?;
        let value = decode_tag_value(buf)?;
        tags.insert(key, value);
    }

    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed("truncated message type".into()));
    }
    let envelope_type = EnvelopeType::try_from(buf.get_u8())?;

    let message = match envelope_type {
        EnvelopeType::Log => {
            if buf.remaining() < 1 {
                return Err(ProtocolError::Malformed("truncated log type".into()));
            }
            let log_type = match buf.get_u8() {
                0 => LogType::Out,
                1 => LogType::Err,
                v => {
                    return Err(ProtocolError::Malformed(format!(
                        "unknown log type: {v}"
                    )));
                }
            };
            let payload = decode_bytes(buf)?;
            Message::Log(Log { payload, log_type })
        }
        EnvelopeType::Counter => {
            let name = decode_string(buf)?;
            if buf.remaining() < 8 {
                return Err(ProtocolError::Malformed("truncated counter delta".into()));
            }
            Message::Counter(Counter {
                name,
                delta: buf.get_u64(),
            })
        }
        EnvelopeType::Gauge => {
            if buf.remaining() < 4 {
                return Err(ProtocolError::Malformed("truncated gauge count".into()));
            }
            let count = buf.get_u32() as usize;
            let mut gauge = Gauge::default();
            for _ in 0..count {
                let name = decode_string(buf)?;
                let unit = decode_string(buf)?;
                if buf.remaining() < 8 {
                    return Err(ProtocolError::Malformed("truncated gauge value".into()));
                }
                gauge.metrics.insert(
                    name,
                    GaugeValue {
                        unit,
                        value: buf.get_f64(),
                    },
                );
            }
            Message::Gauge(gauge)
        }
        EnvelopeType::Timer => {
            let name = decode_string(buf)?;
            if buf.remaining() < 16 {
                return Err(ProtocolError::Malformed("truncated timer".into()));
            }
            Message::Timer(Timer {
                name,
                start: buf.get_i64(),
                stop: buf.get_i64(),
            })
        }
        EnvelopeType::Event => {
            let title = decode_string(buf)?;
            let body = decode_string(buf)?;
            Message::Event(Event { title, body })
        }
    };

    Ok(Envelope {
        source_id,
        instance_id,
        timestamp,
        tags,
        message,
    })
}

fn encode_envelope_vec(envelopes: &[Envelope], buf: &mut BytesMut) {
    buf.put_u32(envelopes.len() as u32);
    for envelope in envelopes {
        encode_envelope(envelope, buf);
    }
}

fn decode_envelope_vec(buf: &mut Bytes) -> Result<Vec<Envelope>> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Malformed("truncated batch count".into()));
    }
    let count = buf.get_u32() as usize;
    let mut envelopes = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        envelopes.push(decode_envelope(buf)?);
    }
    Ok(envelopes)
}

fn encode_tag_value(value: &TagValue, buf: &mut BytesMut) {
    match value {
        TagValue::Text(s) => {
            buf.put_u8(0);
            encode_string(s, buf);
        }
        TagValue::Int(i) => {
            buf.put_u8(1);
            buf.put_i64(*i);
        }
        TagValue::Float(f) => {
            buf.put_u8(2);
            buf.put_f64(*f);
        }
        TagValue::Bool(b) => {
            buf.put_u8(3);
            buf.put_u8(*b as u8);
        }
    }
}

fn decode_tag_value(buf: &mut Bytes) -> Result<TagValue> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed("truncated tag value".into()));
    }
    match buf.get_u8() {
        0 => Ok(TagValue::Text(decode_string(buf)?)),
        1 => {
            if buf.remaining() < 8 {
                return Err(ProtocolError::Malformed("truncated int tag".into()));
            }
            Ok(TagValue::Int(buf.get_i64()))
        }
        2 => {
            if buf.remaining() < 8 {
                return Err(ProtocolError::Malformed("truncated float tag".into()));
            }
            Ok(TagValue::Float(buf.get_f64()))
        }
        3 => {
            if buf.remaining() < 1 {
                return Err(ProtocolError::Malformed("truncated bool tag".into()));
            }
            Ok(TagValue::Bool(buf.get_u8() != 0))
        }
        v => Err(ProtocolError::Malformed(format!(
            "unknown tag value type: {v}"
        ))),
    }
}

// ============================================================================
// Legacy envelope codec
// ============================================================================

const LEGACY_LOG_MESSAGE: u8 = 0;
const LEGACY_COUNTER_EVENT: u8 = 1;
const LEGACY_VALUE_METRIC: u8 = 2;
const LEGACY_CONTAINER_METRIC: u8 = 3;
const LEGACY_HTTP_TIMER: u8 = 4;
const LEGACY_ERROR: u8 = 5;

fn encode_legacy_envelope(envelope: &LegacyEnvelope, buf: &mut BytesMut) {
    encode_string(&envelope.origin, buf);
    encode_string(&envelope.deployment, buf);
    encode_string(&envelope.job, buf);
    encode_string(&envelope.index, buf);
    encode_string(&envelope.ip, buf);
    buf.put_i64(envelope.timestamp);

    match &envelope.event {
        LegacyEvent::LogMessage {
            app_id,
            message,
            message_type,
        } => {
            buf.put_u8(LEGACY_LOG_MESSAGE);
            encode_string(app_id, buf);
            buf.put_u8(match message_type {
                LogType::Out => 0,
                LogType::Err => 1,
            });
            encode_bytes(message, buf);
        }
        LegacyEvent::CounterEvent { name, delta } => {
            buf.put_u8(LEGACY_COUNTER_EVENT);
            encode_string(name, buf);
            buf.put_u64(*delta);
        }
        LegacyEvent::ValueMetric { name, value, unit } => {
            buf.put_u8(LEGACY_VALUE_METRIC);
            encode_string(name, buf);
            buf.put_f64(*value);
            encode_string(unit, buf);
        }
        LegacyEvent::ContainerMetric {
            app_id,
            instance_index,
            cpu_percentage,
            memory_bytes,
            disk_bytes,
        } => {
            buf.put_u8(LEGACY_CONTAINER_METRIC);
            encode_string(app_id, buf);
            buf.put_i64(*instance_index);
            buf.put_f64(*cpu_percentage);
            buf.put_u64(*memory_bytes);
            buf.put_u64(*disk_bytes);
        }
        LegacyEvent::HttpTimer { name, start, stop } => {
            buf.put_u8(LEGACY_HTTP_TIMER);
            encode_string(name, buf);
            buf.put_i64(*start);
            buf.put_i64(*stop);
        }
        LegacyEvent::Error {
            source,
            code,
            message,
        } => {
            buf.put_u8(LEGACY_ERROR);
            encode_string(source, buf);
            buf.put_i32(*code);
            encode_string(message, buf);
        }
    }
}

fn decode_legacy_envelope(buf: &mut Bytes) -> Result<LegacyEnvelope> {
    let origin = decode_string(buf)?;
    let deployment = decode_string(buf)?;
    let job = decode_string(buf)?;
    let index = decode_string(buf)?;
    let ip = decode_string(buf)?;

    if buf.remaining() < 8 {
        return Err(ProtocolError::Malformed("truncated timestamp".into()));
    }
    let timestamp = buf.get_i64();

    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed("truncated event type".into()));
    }
    let event = match buf.get_u8() {
        LEGACY_LOG_MESSAGE => {
            let app_id = decode_string(buf)?;
            if buf.remaining() < 1 {
                return Err(ProtocolError::Malformed("truncated log type".into()));
            }
            let message_type = match buf.get_u8() {
                0 => LogType::Out,
                1 => LogType::Err,
                v => {
                    return Err(ProtocolError::Malformed(format!(
                        "unknown log type: {v}"
                    )));
                }
            };
            let message = decode_bytes(buf)?;
            LegacyEvent::LogMessage {
                app_id,
                message,
                message_type,
            }
        }
        LEGACY_COUNTER_EVENT => {
            let name = decode_string(buf)?;
            if buf.remaining() < 8 {
                return Err(ProtocolError::Malformed("truncated delta".into()));
            }
            LegacyEvent::CounterEvent {
                name,
                delta: buf.get_u64(),
            }
        }
        LEGACY_VALUE_METRIC => {
            let name = decode_string(buf)?;
            if buf.remaining() < 8 {
                return Err(ProtocolError::Malformed("truncated value".into()));
            }
            let value = buf.get_f64();
            let unit = decode_string(buf)?;
            LegacyEvent::ValueMetric { name, value, unit }
        }
        LEGACY_CONTAINER_METRIC => {
            let app_id = decode_string(buf)?;
            if buf.remaining() < 32 {
                return Err(ProtocolError::Malformed("truncated container metric".into()));
            }
            LegacyEvent::ContainerMetric {
                app_id,
                instance_index: buf.get_i64(),
                cpu_percentage: buf.get_f64(),
                memory_bytes: buf.get_u64(),
                disk_bytes: buf.get_u64(),
            }
        }
        LEGACY_HTTP_TIMER => {
            let name = decode_string(buf)?;
            if buf.remaining() < 16 {
                return Err(ProtocolError::Malformed("truncated timer".into()));
            }
            LegacyEvent::HttpTimer {
                name,
                start: buf.get_i64(),
                stop: buf.get_i64(),
            }
        }
        LEGACY_ERROR => {
            let source = decode_string(buf)?;
            if buf.remaining() < 4 {
                return Err(ProtocolError::Malformed("truncated error code".into()));
            }
            let code = buf.get_i32();
            let message = decode_string(buf)?;
            LegacyEvent::Error {
                source,
                code,
                message,
            }
        }
        v => {
            return Err(ProtocolError::Malformed(format!(
                "unknown legacy event type: {v}"
            )));
        }
    };

    Ok(LegacyEnvelope {
        origin,
        deployment,
        job,
        index,
        ip,
        timestamp,
        event,
    })
}

// ============================================================================
// Request codec
// ============================================================================

const FILTER_NONE: u8 = 0;
const FILTER_SOURCE_ID: u8 = 1;
const FILTER_SOURCE_ID_AND_TYPE: u8 = 2;

fn encode_request(request: &SubscriptionRequest, buf: &mut BytesMut) {
    encode_string(&request.shard_id, buf);
    match &request.filter {
        Filter::None => buf.put_u8(FILTER_NONE),
        Filter::SourceId(source_id) => {
            buf.put_u8(FILTER_SOURCE_ID);
            encode_string(source_id, buf);
        }
        Filter::SourceIdAndType(source_id, envelope_type) => {
            buf.put_u8(FILTER_SOURCE_ID_AND_TYPE);
            encode_string(source_id, buf);
            buf.put_u8(envelope_type.to_u8());
        }
    }
    buf.put_u8(request.batched as u8);
}

fn decode_request(buf: &mut Bytes) -> Result<SubscriptionRequest> {
    let shard_id = decode_string(buf)?;

    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed("truncated filter".into()));
    }
    let filter = match buf.get_u8() {
        FILTER_NONE => Filter::None,
        FILTER_SOURCE_ID => Filter::SourceId(decode_string(buf)?),
        FILTER_SOURCE_ID_AND_TYPE => {
            let source_id = decode_string(buf)?;
            if buf.remaining() < 1 {
                return Err(ProtocolError::Malformed("truncated filter type".into()));
            }
            Filter::SourceIdAndType(source_id, EnvelopeType::try_from(buf.get_u8())?)
        }
        v => {
            return Err(ProtocolError::Malformed(format!(
                "unknown filter type: {v}"
            )));
        }
    };

    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed("truncated request".into()));
    }
    let batched = buf.get_u8() != 0;

    Ok(SubscriptionRequest {
        shard_id,
        filter,
        batched,
    })
}

// ============================================================================
// Encoding helpers
// ============================================================================

fn encode_string(s: &str, buf: &mut BytesMut) {
    let bytes = s.as_bytes();
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn decode_string(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Malformed("truncated string length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Malformed("truncated string".into()));
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {e}")))
}

fn encode_bytes(bytes: &Bytes, buf: &mut BytesMut) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

fn decode_bytes(buf: &mut Bytes) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Malformed("truncated bytes length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Malformed("truncated bytes".into()));
    }
    Ok(buf.split_to(len))
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
