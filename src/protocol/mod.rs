//! # Protocol State Machine
//!
//! The per-node clustering engine and the event vocabulary that drives it.
//!
//! ## Components
//! - **Engine**: role state machine, timers, and message handlers
//! - **Events**: scheduled occurrences and the collaborator traits
//!   (scheduler, transport, mobility feed) the harness implements
//!
//! The engine is passive: it only acts when the harness delivers a due
//! [`events::Event`] or a received frame. See [`engine::Engine`] for the
//! lifecycle.

pub mod engine;
pub mod events;
