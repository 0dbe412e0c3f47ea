//! # Events and Collaborator Seams
//!
//! The engine is single-threaded and event-driven: every state mutation
//! happens inside a timer-fire or packet-handler call made by the driving
//! harness. This module defines the [`Event`] vocabulary and the traits the
//! harness implements to lend the engine a clock, a transport, and a
//! mobility feed.
//!
//! The engine never calls the transport directly from a handler; it
//! schedules an [`Event::Transmit`] through the [`Scheduler`] so every send
//! carries its stagger delay, and the harness feeds the event back via
//! [`crate::protocol::engine::Engine::handle_event`] when it comes due.

use crate::core::message::NodeAddress;
use crate::utils::geometry::Vec2;
use std::time::Duration;

/// Identifier of one bound transport interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

/// Opaque handle to a pending scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// The engine's periodic and single-shot timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Beacon emission plus per-role housekeeping.
    RoleCheck,
    /// Mobility sampling and velocity estimation.
    VelocityCheck,
    /// Election ballot broadcast while Undecided.
    ElectHead,
    /// Single-shot resignation check for a head with no members.
    EmptyCluster,
    /// Periodic purge of the neighbor scoreboard.
    NeighborPurge,
    /// Periodic purge of the candidate-head scoreboard.
    CandidatePurge,
    /// Periodic purge of the member roster.
    MemberPurge,
}

/// A scheduled occurrence delivered back to the engine when due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Timer(TimerKind),
    /// A staggered outgoing frame; the engine hands it to the transport on
    /// delivery.
    Transmit {
        interface: InterfaceId,
        destination: NodeAddress,
        frame: Vec<u8>,
    },
    /// Deferred admission reply to a registration request.
    RegisterReply { to: NodeAddress },
}

/// Discrete-event clock collaborator.
///
/// `schedule` queues an event `after` the current instant and returns a
/// handle; `cancel` on a handle that already fired or was never issued is a
/// no-op.
pub trait Scheduler {
    fn now(&self) -> Duration;
    fn schedule(&self, after: Duration, event: Event) -> TimerHandle;
    fn cancel(&self, handle: TimerHandle);
}

/// Packet transport collaborator. Sends are non-blocking fire-and-forget;
/// delivery failures come back asynchronously through
/// [`crate::protocol::engine::Engine::on_link_failure`].
pub trait Transport {
    fn send(&self, interface: InterfaceId, destination: NodeAddress, frame: &[u8]);
}

/// External mobility feed sampled by the velocity-check timer.
pub trait MobilitySource {
    fn current_position(&self) -> Vec2;
}

/// Capability query for routing stacks that may or may not run the
/// clustering engine, mirroring how a harness discovers the protocol on a
/// node without knowing its concrete stack.
pub trait RoutingProtocol {
    fn as_clustering(&mut self) -> Option<&mut crate::protocol::engine::Engine>;
}
