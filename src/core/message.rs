//! # Protocol Messages
//!
//! The nine message kinds exchanged between clustering nodes, plus the
//! address and role types they carry.
//!
//! Messages are built by the sender for a single transmission and decoded
//! into transient values on the receiving side; nothing here outlives the
//! handler invocation that consumes it. The byte layout lives in
//! [`crate::core::codec`].

use crate::error::{ProtocolError, Result};
use crate::utils::geometry::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 16-byte network address identifying a node.
///
/// The core treats addresses as opaque; transport collaborators decide how
/// they map to real interfaces. The all-zero address is "unspecified" and is
/// what empty directory queries return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeAddress(pub [u8; 16]);

impl NodeAddress {
    pub const UNSPECIFIED: NodeAddress = NodeAddress([0u8; 16]);

    /// All-nodes destination used for broadcast-style sends (Hello,
    /// ElectHead, HeadResign); transport collaborators map it to their own
    /// broadcast primitive.
    pub const BROADCAST: NodeAddress = NodeAddress([
        0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
    ]);

    pub fn is_unspecified(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for NodeAddress {
    fn from(bytes: [u8; 16]) -> Self {
        NodeAddress(bytes)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.0.chunks(2).enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}{:02x}", chunk[0], chunk[1])?;
        }
        Ok(())
    }
}

/// A link-layer hardware address resolved for a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HardwareAddress(pub [u8; 6]);

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Role of a node within the cluster hierarchy.
///
/// Values 0..4 are the live roles; the wire carries them as a `u32`. Any
/// other value on the wire is rejected at decode time, so the historical
/// array-bound sentinel never reaches a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum Role {
    #[default]
    Undecided = 0,
    ClusterMember = 1,
    SubClusterHead = 2,
    MasterClusterHead = 3,
}

impl Role {
    /// Number of live roles (wire values 0..COUNT are valid).
    pub const COUNT: u32 = 4;

    pub fn from_wire(value: u32) -> Result<Role> {
        match value {
            0 => Ok(Role::Undecided),
            1 => Ok(Role::ClusterMember),
            2 => Ok(Role::SubClusterHead),
            3 => Ok(Role::MasterClusterHead),
            other => Err(ProtocolError::InvalidRole(other)),
        }
    }

    pub fn to_wire(self) -> u32 {
        self as u32
    }

    /// True for the two head roles.
    pub fn is_head(self) -> bool {
        self == Role::SubClusterHead || self == Role::MasterClusterHead
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Undecided => "Undecided",
            Role::ClusterMember => "ClusterMember",
            Role::SubClusterHead => "SubClusterHead",
            Role::MasterClusterHead => "MasterClusterHead",
        };
        f.write_str(name)
    }
}

/// Discriminator byte preceding every payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Hello = 0,
    MasterHeadAdv = 1,
    SubHeadAdv = 2,
    ClusterMemberAdv = 3,
    UndecidedAdv = 4,
    ElectHead = 5,
    RegisterRequest = 6,
    RegisterReply = 7,
    HeadResign = 8,
}

impl MessageKind {
    pub fn from_wire(value: u8) -> Result<MessageKind> {
        match value {
            0 => Ok(MessageKind::Hello),
            1 => Ok(MessageKind::MasterHeadAdv),
            2 => Ok(MessageKind::SubHeadAdv),
            3 => Ok(MessageKind::ClusterMemberAdv),
            4 => Ok(MessageKind::UndecidedAdv),
            5 => Ok(MessageKind::ElectHead),
            6 => Ok(MessageKind::RegisterRequest),
            7 => Ok(MessageKind::RegisterReply),
            8 => Ok(MessageKind::HeadResign),
            other => Err(ProtocolError::UnknownMessageKind(other)),
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

/// Periodic one-hop beacon carrying the sender's mobility sample and scores.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hello {
    pub address: NodeAddress,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rpm: f64,
    pub rsm: f64,
    pub role: Role,
    pub member_count: u32,
}

/// Advertisement broadcast by a node that has not yet joined a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UndecidedAdv {
    pub reserved: u8,
    pub sequence: u16,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rpm: f64,
}

/// Advertisement of a master cluster head; `head_address` is the head's
/// own address, distinct from the transport source of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MasterHeadAdv {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rpm: f64,
    pub head_address: NodeAddress,
}

/// Election ballot nominating one neighbor as the new master head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElectHead {
    pub nominee: NodeAddress,
}

/// Request to join the cluster led by `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterRequest {
    pub target: NodeAddress,
    pub registrant: NodeAddress,
}

/// Admission reply carrying the head's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterReply {
    pub head_address: NodeAddress,
}

/// Announcement that the named head resigns its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadResign {
    pub address: NodeAddress,
}

/// Reserved sub-head advertisement; accepted but produces no state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubHeadAdv {
    pub target: NodeAddress,
}

/// Reserved member advertisement; accepted but produces no state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterMemberAdv {
    pub target: NodeAddress,
}

/// A decoded protocol message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Hello(Hello),
    MasterHeadAdv(MasterHeadAdv),
    SubHeadAdv(SubHeadAdv),
    ClusterMemberAdv(ClusterMemberAdv),
    UndecidedAdv(UndecidedAdv),
    ElectHead(ElectHead),
    RegisterRequest(RegisterRequest),
    RegisterReply(RegisterReply),
    HeadResign(HeadResign),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Hello(_) => MessageKind::Hello,
            Message::MasterHeadAdv(_) => MessageKind::MasterHeadAdv,
            Message::SubHeadAdv(_) => MessageKind::SubHeadAdv,
            Message::ClusterMemberAdv(_) => MessageKind::ClusterMemberAdv,
            Message::UndecidedAdv(_) => MessageKind::UndecidedAdv,
            Message::ElectHead(_) => MessageKind::ElectHead,
            Message::RegisterRequest(_) => MessageKind::RegisterRequest,
            Message::RegisterReply(_) => MessageKind::RegisterReply,
            Message::HeadResign(_) => MessageKind::HeadResign,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_values() {
        for value in 0..Role::COUNT {
            let role = Role::from_wire(value).expect("live role");
            assert_eq!(role.to_wire(), value);
        }
        assert!(matches!(
            Role::from_wire(Role::COUNT),
            Err(ProtocolError::InvalidRole(4))
        ));
    }

    #[test]
    fn test_role_is_head() {
        assert!(!Role::Undecided.is_head());
        assert!(!Role::ClusterMember.is_head());
        assert!(Role::SubClusterHead.is_head());
        assert!(Role::MasterClusterHead.is_head());
    }

    #[test]
    fn test_kind_wire_values() {
        for value in 0..=8 {
            let kind = MessageKind::from_wire(value).expect("known kind");
            assert_eq!(kind.to_wire(), value);
        }
        assert!(MessageKind::from_wire(9).is_err());
        assert!(MessageKind::from_wire(0xff).is_err());
    }

    #[test]
    fn test_address_display() {
        let addr = NodeAddress([
            0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
        ]);
        assert_eq!(addr.to_string(), "fe80:0000:0000:0000:0000:0000:0000:0001");
    }

    #[test]
    fn test_unspecified_address() {
        assert!(NodeAddress::UNSPECIFIED.is_unspecified());
        assert!(!NodeAddress([1; 16]).is_unspecified());
    }
}
