// MeshTail - core/wire.rs
//
// Fixed-layout mesh frames for the control, line-submission and
// identity-announcement channels.
//
// Layout (little-endian):
//
//   offset  size  field
//   0       1     magic (0xA5)
//   1       1     version (1)
//   2       1     kind
//   3       1     reserved (0)
//   4       4     sequence (per-sender frame counter)
//   8       6     sender address
//   14      ..    payload, one fixed shape per kind:
//                   Control  (3): u8 enable (0/1)
//                   Line     (4): u16 length + UTF-8 bytes (<= MAX_LINE_BYTES)
//                   Announce (5): 16-byte NUL-padded label
//
// Kinds 1 (legacy text) and 2 (time sync) are spoken by other subsystems
// on the same mesh and are rejected here like any unknown kind.

use crate::core::model::{bound_line, Label, NodeAddress};
use crate::util::constants::{
    FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION, MAX_LABEL_BYTES, MAX_LINE_BYTES,
};
use crate::util::error::WireError;
use bytes::{Buf, BufMut, BytesMut};
use std::sync::atomic::{AtomicU32, Ordering};

const KIND_CONTROL: u8 = 3;
const KIND_LINE: u8 = 4;
const KIND_ANNOUNCE: u8 = 5;

const LABEL_FIELD_LEN: usize = MAX_LABEL_BYTES + 1;

/// Frame header shared by every message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub sequence: u32,
    pub sender: NodeAddress,
}

/// Message body, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshMessage {
    /// Aggregator -> peer: start (`true`) or stop forwarding lines.
    Control { enable: bool },
    /// Peer -> aggregator: one local log line.
    Line { text: String },
    /// Any node -> aggregator: "I exist, call me `label`".
    Announce { label: Label },
}

impl MeshMessage {
    fn kind(&self) -> u8 {
        match self {
            Self::Control { .. } => KIND_CONTROL,
            Self::Line { .. } => KIND_LINE,
            Self::Announce { .. } => KIND_ANNOUNCE,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub message: MeshMessage,
}

impl Frame {
    /// Serialise to the fixed wire layout. Line text is capped, never
    /// rejected.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 2 + MAX_LINE_BYTES);
        buf.put_u8(FRAME_MAGIC);
        buf.put_u8(FRAME_VERSION);
        buf.put_u8(self.message.kind());
        buf.put_u8(0);
        buf.put_u32_le(self.header.sequence);
        buf.put_slice(&self.header.sender.octets());
        match &self.message {
            MeshMessage::Control { enable } => buf.put_u8(u8::from(*enable)),
            MeshMessage::Line { text } => {
                let text = bound_line(text);
                buf.put_u16_le(text.len() as u16);
                buf.put_slice(text.as_bytes());
            }
            MeshMessage::Announce { label } => {
                let mut field = [0u8; LABEL_FIELD_LEN];
                let bytes = label.as_str().as_bytes();
                field[..bytes.len()].copy_from_slice(bytes);
                buf.put_slice(&field);
            }
        }
        buf.to_vec()
    }

    /// Parse one datagram. Trailing bytes after the payload are ignored.
    pub fn decode(mut data: &[u8]) -> Result<Self, WireError> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(WireError::Truncated {
                needed: FRAME_HEADER_LEN,
                actual: data.len(),
            });
        }
        let magic = data.get_u8();
        if magic != FRAME_MAGIC {
            return Err(WireError::BadMagic(magic));
        }
        let version = data.get_u8();
        if version != FRAME_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let kind = data.get_u8();
        let _reserved = data.get_u8();
        let sequence = data.get_u32_le();
        let mut sender = [0u8; NodeAddress::LEN];
        data.copy_to_slice(&mut sender);
        let header = Header {
            sequence,
            sender: NodeAddress(sender),
        };

        let message = match kind {
            KIND_CONTROL => {
                need(data.remaining(), 1)?;
                match data.get_u8() {
                    0 => MeshMessage::Control { enable: false },
                    1 => MeshMessage::Control { enable: true },
                    _ => {
                        return Err(WireError::BadPayload {
                            kind,
                            reason: "control flag must be 0 or 1",
                        })
                    }
                }
            }
            KIND_LINE => {
                need(data.remaining(), 2)?;
                let len = data.get_u16_le() as usize;
                if len > MAX_LINE_BYTES {
                    return Err(WireError::BadPayload {
                        kind,
                        reason: "line longer than the line cap",
                    });
                }
                need(data.remaining(), len)?;
                let text = String::from_utf8_lossy(&data[..len]).into_owned();
                MeshMessage::Line { text }
            }
            KIND_ANNOUNCE => {
                need(data.remaining(), LABEL_FIELD_LEN)?;
                let field = &data[..LABEL_FIELD_LEN];
                let end = field.iter().position(|b| *b == 0).unwrap_or(MAX_LABEL_BYTES);
                let label = Label::new(&String::from_utf8_lossy(&field[..end]));
                MeshMessage::Announce { label }
            }
            other => return Err(WireError::UnknownKind(other)),
        };

        Ok(Self { header, message })
    }
}

fn need(remaining: usize, n: usize) -> Result<(), WireError> {
    if remaining < n {
        return Err(WireError::Truncated {
            needed: FRAME_HEADER_LEN + n,
            actual: FRAME_HEADER_LEN + remaining,
        });
    }
    Ok(())
}

/// Stamps outgoing frames with the local address and a running counter.
#[derive(Debug)]
pub struct FrameStamper {
    local: NodeAddress,
    counter: AtomicU32,
}

impl FrameStamper {
    pub fn new(local: NodeAddress) -> Self {
        Self {
            local,
            counter: AtomicU32::new(0),
        }
    }

    pub fn local(&self) -> NodeAddress {
        self.local
    }

    /// Wrap `message` in a header and encode it.
    pub fn encode(&self, message: MeshMessage) -> Vec<u8> {
        Frame {
            header: Header {
                sequence: self.counter.fetch_add(1, Ordering::Relaxed),
                sender: self.local,
            },
            message,
        }
        .encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: NodeAddress = NodeAddress([0xa0, 0xdd, 0x6c, 0x0f, 0x31, 0xe4]);

    fn frame(message: MeshMessage) -> Frame {
        Frame {
            header: Header {
                sequence: 7,
                sender: SENDER,
            },
            message,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = frame(MeshMessage::Control { enable: true }).encode();
        assert_eq!(bytes.len(), FRAME_HEADER_LEN + 1);
        assert_eq!(&bytes[..4], &[0xA5, 1, KIND_CONTROL, 0]);
        assert_eq!(&bytes[4..8], &7u32.to_le_bytes());
        assert_eq!(&bytes[8..14], &SENDER.octets());
        assert_eq!(bytes[14], 1);
    }

    #[test]
    fn test_each_kind_decodes() {
        for message in [
            MeshMessage::Control { enable: false },
            MeshMessage::Line {
                text: "I (120) wifi: connected".to_string(),
            },
            MeshMessage::Announce {
                label: Label::new("kitchen"),
            },
        ] {
            let original = frame(message);
            assert_eq!(Frame::decode(&original.encode()), Ok(original));
        }
    }

    #[test]
    fn test_oversized_line_is_capped_on_encode() {
        let bytes = frame(MeshMessage::Line {
            text: "y".repeat(1000),
        })
        .encode();
        match Frame::decode(&bytes).unwrap().message {
            MeshMessage::Line { text } => assert_eq!(text.len(), MAX_LINE_BYTES),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_foreign_and_broken_frames() {
        let good = frame(MeshMessage::Control { enable: true }).encode();

        assert!(matches!(
            Frame::decode(&good[..10]),
            Err(WireError::Truncated { .. })
        ));

        let mut bad_magic = good.clone();
        bad_magic[0] = 0x5A;
        assert_eq!(Frame::decode(&bad_magic), Err(WireError::BadMagic(0x5A)));

        let mut bad_version = good.clone();
        bad_version[1] = 2;
        assert_eq!(
            Frame::decode(&bad_version),
            Err(WireError::UnsupportedVersion(2))
        );

        // Legacy text frames share the mesh but are not ours.
        let mut legacy = good.clone();
        legacy[2] = 1;
        assert_eq!(Frame::decode(&legacy), Err(WireError::UnknownKind(1)));

        let mut bad_flag = good;
        bad_flag[14] = 9;
        assert!(matches!(
            Frame::decode(&bad_flag),
            Err(WireError::BadPayload { .. })
        ));
    }

    #[test]
    fn test_line_length_must_match_payload() {
        let mut bytes = frame(MeshMessage::Line {
            text: "hello".to_string(),
        })
        .encode();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_stamper_counts_frames() {
        let stamper = FrameStamper::new(SENDER);
        let a = Frame::decode(&stamper.encode(MeshMessage::Control { enable: true })).unwrap();
        let b = Frame::decode(&stamper.encode(MeshMessage::Control { enable: false })).unwrap();
        assert_eq!(a.header.sequence + 1, b.header.sequence);
        assert_eq!(b.header.sender, SENDER);
    }
}
