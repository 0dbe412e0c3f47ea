//! # Core Protocol Components
//!
//! Message definitions and the fixed-layout binary wire format.
//!
//! ## Components
//! - **Message**: the nine protocol message kinds and the types they carry
//! - **Codec**: constant-size frame encode/decode
//!
//! ## Wire Format
//! ```text
//! [Kind(1)] [Payload(fixed per kind)]
//! ```
//!
//! Frame sizes are part of the protocol contract; see
//! [`codec::frame_size`]. Doubles are transmitted as big-endian IEEE-754
//! bit patterns.

pub mod codec;
pub mod message;
