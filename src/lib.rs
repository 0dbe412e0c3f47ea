//! # Cluster Protocol
//!
//! Mobility-based clustering for vehicular ad-hoc networks: nodes score
//! their neighborhoods, elect cluster heads, register as members, and hand
//! over between clusters as they move.
//!
//! ## Architecture
//! - [`core`]: the nine protocol messages and their fixed binary wire format
//! - [`directory`]: expiring peer registries with RPM/RSM scoring
//! - [`protocol`]: the per-node role state machine and its collaborator
//!   seams
//! - [`config`]: protocol constants and per-node tunables
//! - [`error`]: the crate-wide error type
//!
//! ## Usage
//! ```no_run
//! use cluster_protocol::core::message::NodeAddress;
//! use cluster_protocol::protocol::engine::Engine;
//! # use cluster_protocol::protocol::events::{Scheduler, Transport, MobilitySource};
//! # fn collaborators() -> (std::rc::Rc<dyn Scheduler>, std::rc::Rc<dyn Transport>, std::rc::Rc<dyn MobilitySource>) { unimplemented!() }
//!
//! let (scheduler, transport, mobility) = collaborators();
//! let mut engine = Engine::builder(NodeAddress([1; 16]))
//!     .scheduler(scheduler)
//!     .transport(transport)
//!     .mobility(mobility)
//!     .build()?;
//! engine.start();
//! # Ok::<(), cluster_protocol::error::ProtocolError>(())
//! ```
//!
//! The engine is single-threaded and event-driven; the embedding harness
//! owns the clock and feeds due events back through
//! [`protocol::engine::Engine::handle_event`].

pub mod config;
pub mod core;
pub mod directory;
pub mod error;
pub mod protocol;
pub mod utils;

pub use config::NodeConfig;
pub use crate::core::message::{Message, MessageKind, NodeAddress, Role};
pub use directory::{CandidateHeadScoreboard, MemberRoster, NeighborScoreboard, ProximityState};
pub use error::{ProtocolError, Result};
pub use protocol::engine::Engine;
pub use protocol::events::{Event, InterfaceId, TimerKind};
