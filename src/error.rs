//! # Error Types
//!
//! Error handling for the clustering protocol core.
//!
//! This module defines all error variants that can occur during protocol
//! operations, from wire-format violations to role state machine bugs.
//!
//! ## Error Categories
//! - **Codec Errors**: Truncated or oversized frames, unknown discriminators,
//!   out-of-range role values
//! - **Protocol Errors**: Illegal role transitions, operations attempted
//!   before a transport interface is bound
//! - **Configuration Errors**: Invalid or unreadable node configuration
//!
//! Codec errors are fatal by contract: peers run compatible code, so a
//! malformed frame means a corrupted stream and processing of that frame
//! aborts. Expected conditions (empty directories, unknown addresses in
//! `set_own_head`, lost replies) are modelled as plain return values, not
//! errors.
//!
//! All errors implement `std::error::Error` for interoperability.

use crate::core::message::Role;
use std::io;
use thiserror::Error;

/// ProtocolError is the primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("truncated message: kind {kind:#04x} needs {expected} bytes, got {actual}")]
    TruncatedMessage {
        kind: u8,
        expected: usize,
        actual: usize,
    },

    #[error("trailing bytes after message: kind {kind:#04x} is {expected} bytes, got {actual}")]
    OversizedMessage {
        kind: u8,
        expected: usize,
        actual: usize,
    },

    #[error("unknown message kind: {0:#04x}")]
    UnknownMessageKind(u8),

    #[error("role value out of range on the wire: {0}")]
    InvalidRole(u32),

    #[error("illegal role transition: {from:?} -> {to:?}")]
    InvalidRoleTransition { from: Role, to: Role },

    #[error("no transport interface bound")]
    NotBound,

    #[error("empty frame")]
    EmptyFrame,

    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
