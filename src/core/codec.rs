//! # Wire Codec
//!
//! Fixed-layout binary encoding for the nine message kinds.
//!
//! ## Wire Format
//! ```text
//! [Kind(1)] [Payload(fixed per kind)]
//! ```
//!
//! Every kind has a constant serialized size; `decode` must consume exactly
//! that many bytes. A shorter or longer frame, or an unknown discriminator,
//! is a fatal protocol-invariant violation: peers are assumed to run
//! compatible code, so a size mismatch means a corrupted stream and
//! processing aborts. Higher layers may still ignore *known* kinds they do
//! not act on; the codec never does.
//!
//! Floating-point fields travel as the raw IEEE-754 double bit pattern in
//! big-endian byte order (`f64::to_bits` / `f64::from_bits`), reinterpreted
//! verbatim on the receiving side.

use crate::core::message::{
    ClusterMemberAdv, ElectHead, HeadResign, Hello, MasterHeadAdv, Message, MessageKind,
    NodeAddress, RegisterReply, RegisterRequest, Role, SubHeadAdv, UndecidedAdv,
};
use crate::error::{ProtocolError, Result};
use crate::utils::geometry::Vec2;
use bytes::{Buf, BufMut, BytesMut};

/// Payload size in bytes for a message kind (discriminator excluded).
pub const fn payload_size(kind: MessageKind) -> usize {
    match kind {
        MessageKind::Hello => 16 + 4 * 8 + 8 + 8 + 4 + 4,
        MessageKind::UndecidedAdv => 1 + 2 + 4 * 8 + 8,
        MessageKind::MasterHeadAdv => 4 * 8 + 8 + 16,
        MessageKind::ElectHead
        | MessageKind::RegisterReply
        | MessageKind::HeadResign
        | MessageKind::SubHeadAdv
        | MessageKind::ClusterMemberAdv => 16,
        MessageKind::RegisterRequest => 32,
    }
}

/// Full frame size for a message kind, discriminator byte included.
pub const fn frame_size(kind: MessageKind) -> usize {
    payload_size(kind) + 1
}

/// Encode a message into its fixed-length frame.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(frame_size(message.kind()));
    buf.put_u8(message.kind().to_wire());
    match message {
        Message::Hello(m) => {
            put_address(&mut buf, &m.address);
            put_vec2(&mut buf, m.position);
            put_vec2(&mut buf, m.velocity);
            put_f64(&mut buf, m.rpm);
            put_f64(&mut buf, m.rsm);
            buf.put_u32(m.role.to_wire());
            buf.put_u32(m.member_count);
        }
        Message::UndecidedAdv(m) => {
            buf.put_u8(m.reserved);
            buf.put_u16(m.sequence);
            put_vec2(&mut buf, m.position);
            put_vec2(&mut buf, m.velocity);
            put_f64(&mut buf, m.rpm);
        }
        Message::MasterHeadAdv(m) => {
            put_vec2(&mut buf, m.position);
            put_vec2(&mut buf, m.velocity);
            put_f64(&mut buf, m.rpm);
            put_address(&mut buf, &m.head_address);
        }
        Message::ElectHead(m) => put_address(&mut buf, &m.nominee),
        Message::RegisterRequest(m) => {
            put_address(&mut buf, &m.target);
            put_address(&mut buf, &m.registrant);
        }
        Message::RegisterReply(m) => put_address(&mut buf, &m.head_address),
        Message::HeadResign(m) => put_address(&mut buf, &m.address),
        Message::SubHeadAdv(m) => put_address(&mut buf, &m.target),
        Message::ClusterMemberAdv(m) => put_address(&mut buf, &m.target),
    }
    debug_assert_eq!(buf.len(), frame_size(message.kind()));
    buf.to_vec()
}

/// Decode one frame. The slice must hold exactly one message.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let (&kind_byte, mut payload) = bytes.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let kind = MessageKind::from_wire(kind_byte)?;

    let expected = payload_size(kind);
    if payload.len() < expected {
        return Err(ProtocolError::TruncatedMessage {
            kind: kind_byte,
            expected,
            actual: payload.len(),
        });
    }
    if payload.len() > expected {
        return Err(ProtocolError::OversizedMessage {
            kind: kind_byte,
            expected,
            actual: payload.len(),
        });
    }

    let buf = &mut payload;
    let message = match kind {
        MessageKind::Hello => Message::Hello(Hello {
            address: get_address(buf),
            position: get_vec2(buf),
            velocity: get_vec2(buf),
            rpm: get_f64(buf),
            rsm: get_f64(buf),
            role: Role::from_wire(buf.get_u32())?,
            member_count: buf.get_u32(),
        }),
        MessageKind::UndecidedAdv => Message::UndecidedAdv(UndecidedAdv {
            reserved: buf.get_u8(),
            sequence: buf.get_u16(),
            position: get_vec2(buf),
            velocity: get_vec2(buf),
            rpm: get_f64(buf),
        }),
        MessageKind::MasterHeadAdv => Message::MasterHeadAdv(MasterHeadAdv {
            position: get_vec2(buf),
            velocity: get_vec2(buf),
            rpm: get_f64(buf),
            head_address: get_address(buf),
        }),
        MessageKind::ElectHead => Message::ElectHead(ElectHead {
            nominee: get_address(buf),
        }),
        MessageKind::RegisterRequest => Message::RegisterRequest(RegisterRequest {
            target: get_address(buf),
            registrant: get_address(buf),
        }),
        MessageKind::RegisterReply => Message::RegisterReply(RegisterReply {
            head_address: get_address(buf),
        }),
        MessageKind::HeadResign => Message::HeadResign(HeadResign {
            address: get_address(buf),
        }),
        MessageKind::SubHeadAdv => Message::SubHeadAdv(SubHeadAdv {
            target: get_address(buf),
        }),
        MessageKind::ClusterMemberAdv => Message::ClusterMemberAdv(ClusterMemberAdv {
            target: get_address(buf),
        }),
    };
    Ok(message)
}

fn put_address(buf: &mut BytesMut, address: &NodeAddress) {
    buf.put_slice(address.as_bytes());
}

fn put_f64(buf: &mut BytesMut, value: f64) {
    buf.put_u64(value.to_bits());
}

fn put_vec2(buf: &mut BytesMut, v: Vec2) {
    put_f64(buf, v.x);
    put_f64(buf, v.y);
}

fn get_address(buf: &mut &[u8]) -> NodeAddress {
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    NodeAddress(bytes)
}

fn get_f64(buf: &mut &[u8]) -> f64 {
    f64::from_bits(buf.get_u64())
}

fn get_vec2(buf: &mut &[u8]) -> Vec2 {
    let x = get_f64(buf);
    let y = get_f64(buf);
    Vec2::new(x, y)
}
