//! Framed codec for the plaintext Ember Link transport.
//!
//! Frame layout, in order:
//!
//! ```text
//! preamble:  u8      always 0x00 for plaintext frames
//! length:    varint  payload length in bytes
//! kind:      varint  message kind (see `MessageKind`)
//! payload:   [u8]    bincode-serialized payload
//! ```
//!
//! A non-zero preamble byte means the peer is speaking something this
//! codec cannot read (most likely an encrypted transport) and is
//! surfaced as a frame error. Frames with an unknown kind are skipped
//! with a warning so that newer firmware does not break the session.

use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

use crate::error::EmberError;
use crate::message::{Message, MessageKind};

/// First byte of every plaintext frame.
pub const FRAME_PREAMBLE: u8 = 0x00;

/// Upper bound on a single payload.
pub const MAX_PAYLOAD_SIZE: usize = 65_536;

/// Longest legal varint encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Default)]
pub struct EmberCodec;

// ── Varint helpers ───────────────────────────────────────────────

fn put_varint(dst: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            dst.put_u8(byte | 0x80);
        } else {
            dst.put_u8(byte);
            return;
        }
    }
}

/// Returns `Ok(None)` when the buffer ends mid-varint.
fn get_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, EmberError> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(EmberError::InvalidFrame("varint longer than 10 bytes"));
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

// ── Decoder / Encoder ────────────────────────────────────────────

impl tokio_util::codec::Decoder for EmberCodec {
    type Item = Message;
    type Error = EmberError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }
            if src[0] != FRAME_PREAMBLE {
                return Err(EmberError::InvalidFrame("unexpected preamble byte"));
            }

            let mut offset = 1;
            let Some((length, n)) = get_varint(&src[offset..])? else {
                return Ok(None);
            };
            offset += n;

            let length = length as usize;
            if length > MAX_PAYLOAD_SIZE {
                return Err(EmberError::FrameTooLarge {
                    size: length,
                    max: MAX_PAYLOAD_SIZE,
                });
            }

            let Some((raw_kind, n)) = get_varint(&src[offset..])? else {
                return Ok(None);
            };
            offset += n;

            if src.len() < offset + length {
                src.reserve(offset + length - src.len());
                return Ok(None);
            }

            match MessageKind::try_from(raw_kind) {
                Ok(kind) => {
                    let msg = Message::decode_payload(kind, &src[offset..offset + length])?;
                    src.advance(offset + length);
                    return Ok(Some(msg));
                }
                Err(_) => {
                    // Unknown kinds are not fatal — skip the frame and
                    // keep the session alive.
                    warn!(kind = raw_kind, "skipping frame of unsupported kind");
                    src.advance(offset + length);
                }
            }
        }
    }
}

impl tokio_util::codec::Encoder<Message> for EmberCodec {
    type Error = EmberError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.encode_payload()?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EmberError::FrameTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.put_u8(FRAME_PREAMBLE);
        put_varint(dst, payload.len() as u64);
        put_varint(dst, item.kind() as u64);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}
