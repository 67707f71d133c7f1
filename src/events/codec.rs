//! Binary wire format for [`Event`].
//!
//! The layout is the protobuf encoding of the `RequestAPIEvent` message:
//!
//! ```text
//! 1: request_id  uint64 (varint)
//! 2: event       enum   (varint, EventKind wire value)
//! 3: error       string
//! 4: trace_span  map<string, string>
//! ```
//!
//! Default values are omitted as proto3 does. Map entries are written in key
//! order, and both key and value are always present inside an entry.

use super::{Event, EventKind};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

const FIELD_REQUEST_ID: u32 = 1;
const FIELD_EVENT: u32 = 2;
const FIELD_ERROR: u32 = 3;
const FIELD_TRACE_SPAN: u32 = 4;

const ENTRY_KEY: u32 = 1;
const ENTRY_VALUE: u32 = 2;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LEN: u32 = 2;
const WIRE_FIXED32: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("message truncated")]
    Truncated,

    #[error("varint longer than 10 bytes")]
    VarintOverflow,

    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 { field: u32 },

    #[error("unknown event kind {0}")]
    UnknownEventKind(u64),

    #[error("unsupported wire type {wire} for field {field}")]
    UnsupportedWireType { field: u32, wire: u32 },
}

/// An event together with its payload, encoded exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    event: Event,
    payload: Bytes,
}

impl EncodedEvent {
    pub fn new(event: Event) -> Self {
        let payload = encode(&event);
        Self { event, payload }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl From<Event> for EncodedEvent {
    fn from(event: Event) -> Self {
        Self::new(event)
    }
}

pub fn encode(event: &Event) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(event));
    if event.request_id != 0 {
        put_key(&mut buf, FIELD_REQUEST_ID, WIRE_VARINT);
        put_varint(&mut buf, event.request_id);
    }
    if event.kind.as_wire() != 0 {
        put_key(&mut buf, FIELD_EVENT, WIRE_VARINT);
        put_varint(&mut buf, event.kind.as_wire());
    }
    if let Some(error) = event.error.as_deref().filter(|e| !e.is_empty()) {
        put_string(&mut buf, FIELD_ERROR, error);
    }
    for (key, value) in &event.trace_context {
        put_key(&mut buf, FIELD_TRACE_SPAN, WIRE_LEN);
        put_varint(&mut buf, entry_len(key, value) as u64);
        put_string(&mut buf, ENTRY_KEY, key);
        put_string(&mut buf, ENTRY_VALUE, value);
    }
    buf.freeze()
}

pub fn encoded_len(event: &Event) -> usize {
    let mut len = 0;
    if event.request_id != 0 {
        len += key_len(FIELD_REQUEST_ID) + varint_len(event.request_id);
    }
    if event.kind.as_wire() != 0 {
        len += key_len(FIELD_EVENT) + varint_len(event.kind.as_wire());
    }
    if let Some(error) = event.error.as_deref().filter(|e| !e.is_empty()) {
        len += string_field_len(FIELD_ERROR, error);
    }
    for (key, value) in &event.trace_context {
        let entry = entry_len(key, value);
        len += key_len(FIELD_TRACE_SPAN) + varint_len(entry as u64) + entry;
    }
    len
}

pub fn decode(mut buf: &[u8]) -> Result<Event, CodecError> {
    let mut event = Event::new(0, EventKind::Create);
    let mut trace = BTreeMap::new();

    while buf.has_remaining() {
        let (field, wire) = get_key(&mut buf)?;
        match (field, wire) {
            (FIELD_REQUEST_ID, WIRE_VARINT) => event.request_id = get_varint(&mut buf)?,
            (FIELD_EVENT, WIRE_VARINT) => {
                let raw = get_varint(&mut buf)?;
                event.kind = EventKind::from_wire(raw).ok_or(CodecError::UnknownEventKind(raw))?;
            }
            (FIELD_ERROR, WIRE_LEN) => {
                let error = get_string(&mut buf, FIELD_ERROR)?;
                event.error = (!error.is_empty()).then_some(error);
            }
            (FIELD_TRACE_SPAN, WIRE_LEN) => {
                let mut entry = get_len_delimited(&mut buf)?;
                let (key, value) = decode_entry(&mut entry)?;
                trace.insert(key, value);
            }
            _ => skip_field(&mut buf, field, wire)?,
        }
    }

    event.trace_context = trace;
    Ok(event)
}

fn decode_entry(entry: &mut &[u8]) -> Result<(String, String), CodecError> {
    let mut key = String::new();
    let mut value = String::new();
    while entry.has_remaining() {
        match get_key(entry)? {
            (ENTRY_KEY, WIRE_LEN) => key = get_string(entry, FIELD_TRACE_SPAN)?,
            (ENTRY_VALUE, WIRE_LEN) => value = get_string(entry, FIELD_TRACE_SPAN)?,
            (field, wire) => skip_field(entry, field, wire)?,
        }
    }
    Ok((key, value))
}

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn put_key(buf: &mut BytesMut, field: u32, wire: u32) {
    put_varint(buf, u64::from((field << 3) | wire));
}

fn put_string(buf: &mut BytesMut, field: u32, value: &str) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

fn key_len(field: u32) -> usize {
    varint_len(u64::from(field << 3))
}

fn string_field_len(field: u32, value: &str) -> usize {
    key_len(field) + varint_len(value.len() as u64) + value.len()
}

fn entry_len(key: &str, value: &str) -> usize {
    string_field_len(ENTRY_KEY, key) + string_field_len(ENTRY_VALUE, value)
}

fn get_varint(buf: &mut &[u8]) -> Result<u64, CodecError> {
    let mut value = 0u64;
    for shift in (0..70).step_by(7) {
        if !buf.has_remaining() {
            return Err(CodecError::Truncated);
        }
        let byte = buf.get_u8();
        if shift == 63 && byte > 1 {
            return Err(CodecError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte < 0x80 {
            return Ok(value);
        }
    }
    Err(CodecError::VarintOverflow)
}

fn get_key(buf: &mut &[u8]) -> Result<(u32, u32), CodecError> {
    let key = get_varint(buf)?;
    Ok(((key >> 3) as u32, (key & 0x7) as u32))
}

fn get_len_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = get_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

fn get_string(buf: &mut &[u8], field: u32) -> Result<String, CodecError> {
    let raw = get_len_delimited(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
}

fn skip_field(buf: &mut &[u8], field: u32, wire: u32) -> Result<(), CodecError> {
    let skip = match wire {
        WIRE_VARINT => {
            get_varint(buf)?;
            return Ok(());
        }
        WIRE_FIXED64 => 8,
        WIRE_LEN => {
            get_len_delimited(buf)?;
            return Ok(());
        }
        WIRE_FIXED32 => 4,
        _ => return Err(CodecError::UnsupportedWireType { field, wire }),
    };
    if buf.remaining() < skip {
        return Err(CodecError::Truncated);
    }
    buf.advance(skip);
    Ok(())
}
