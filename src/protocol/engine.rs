//! # Protocol Engine
//!
//! The per-node role state machine: timers, message handlers, and the
//! election, registration, and handover logic that ties the directories and
//! the codec together.
//!
//! ## Role Lifecycle
//! ```text
//! Undecided --ElectHead(self)--> MasterClusterHead
//!     ^                              |
//!     +---------EmptyCluster---------+
//!     |
//!     +--RegisterReply--> ClusterMember --handover--> (new head)
//! ```
//!
//! All mutation happens inside [`Engine::handle_event`] and
//! [`Engine::on_packet_received`]; the harness guarantees no two callbacks
//! for the same node run concurrently, so the engine holds no locks.

use crate::config::{NodeConfig, SEND_STAGGER};
use crate::core::codec;
use crate::core::message::{
    ElectHead, HeadResign, Hello, Message, NodeAddress, RegisterReply, RegisterRequest, Role,
};
use crate::directory::{
    CandidateHeadScoreboard, MemberRoster, NeighborScoreboard, ResolutionTable,
};
use crate::error::{ProtocolError, Result};
use crate::protocol::events::{
    Event, InterfaceId, MobilitySource, Scheduler, TimerHandle, TimerKind, Transport,
};
use crate::utils::geometry::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Builder for [`Engine`]; collaborators are mandatory and their absence is
/// a configuration error at build time.
pub struct EngineBuilder {
    config: NodeConfig,
    own_address: NodeAddress,
    default_role: Role,
    scheduler: Option<Rc<dyn Scheduler>>,
    transport: Option<Rc<dyn Transport>>,
    mobility: Option<Rc<dyn MobilitySource>>,
}

impl EngineBuilder {
    pub fn new(own_address: NodeAddress) -> Self {
        EngineBuilder {
            config: NodeConfig::default(),
            own_address,
            default_role: Role::Undecided,
            scheduler: None,
            transport: None,
            mobility: None,
        }
    }

    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial-role policy: the role an undecided node promotes itself to
    /// on its next role check. `Undecided` (the default) disables the
    /// promotion and leaves election/registration in charge.
    pub fn default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn mobility(mut self, mobility: Rc<dyn MobilitySource>) -> Self {
        self.mobility = Some(mobility);
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let scheduler = self
            .scheduler
            .ok_or_else(|| ProtocolError::ConfigError("scheduler collaborator missing".into()))?;
        let transport = self
            .transport
            .ok_or_else(|| ProtocolError::ConfigError("transport collaborator missing".into()))?;
        let mobility = self
            .mobility
            .ok_or_else(|| ProtocolError::ConfigError("mobility collaborator missing".into()))?;

        let refresh = self.config.hello_interval;
        Ok(Engine {
            own_address: self.own_address,
            default_role: self.default_role,
            role: Role::Undecided,
            forwarding: false,
            gateway: None,
            interfaces: Vec::new(),
            neighbors: NeighborScoreboard::new(refresh),
            candidate_heads: CandidateHeadScoreboard::new(refresh),
            members: None,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            last_sample_at: Duration::ZERO,
            rng: StdRng::from_rng(&mut rand::rng()),
            role_check_timer: None,
            velocity_timer: None,
            elect_timer: None,
            empty_cluster_timer: None,
            neighbor_purge_timer: None,
            candidate_purge_timer: None,
            member_purge_timer: None,
            become_connectable_at: Duration::ZERO,
            connectable_samples: Vec::new(),
            config: self.config,
            scheduler,
            transport,
            mobility,
        })
    }
}

/// One node's clustering state machine.
pub struct Engine {
    config: NodeConfig,
    own_address: NodeAddress,
    default_role: Role,
    role: Role,
    /// Whether this node forwards traffic for others; heads forward,
    /// undecided nodes do not.
    forwarding: bool,
    /// Next-hop for routed traffic while registered with a head.
    gateway: Option<NodeAddress>,
    interfaces: Vec<InterfaceId>,

    neighbors: NeighborScoreboard,
    candidate_heads: CandidateHeadScoreboard,
    /// Allocated on promotion to master head, released on demotion.
    members: Option<MemberRoster>,

    position: Vec2,
    velocity: Vec2,
    last_sample_at: Duration,

    rng: StdRng,

    role_check_timer: Option<TimerHandle>,
    velocity_timer: Option<TimerHandle>,
    elect_timer: Option<TimerHandle>,
    empty_cluster_timer: Option<TimerHandle>,
    neighbor_purge_timer: Option<TimerHandle>,
    candidate_purge_timer: Option<TimerHandle>,
    member_purge_timer: Option<TimerHandle>,

    become_connectable_at: Duration,
    connectable_samples: Vec<Duration>,

    scheduler: Rc<dyn Scheduler>,
    transport: Rc<dyn Transport>,
    mobility: Rc<dyn MobilitySource>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("own_address", &self.own_address)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(own_address: NodeAddress) -> EngineBuilder {
        EngineBuilder::new(own_address)
    }

    /// Take the first mobility sample and arm every periodic timer. The
    /// first role check carries a random jitter so co-started nodes do not
    /// beacon in lockstep.
    pub fn start(&mut self) {
        let now = self.scheduler.now();
        self.position = self.mobility.current_position();
        self.last_sample_at = now;
        self.become_connectable_at = now;

        let jitter_ms = self
            .rng
            .random_range(0..=self.config.role_check_interval.as_millis() as u64);
        self.role_check_timer = Some(self.scheduler.schedule(
            Duration::from_millis(jitter_ms),
            Event::Timer(TimerKind::RoleCheck),
        ));
        self.velocity_timer = Some(self.scheduler.schedule(
            self.config.velocity_check_interval,
            Event::Timer(TimerKind::VelocityCheck),
        ));
        self.elect_timer = Some(
            self.scheduler
                .schedule(self.config.elect_interval(), Event::Timer(TimerKind::ElectHead)),
        );
        self.neighbor_purge_timer = Some(self.scheduler.schedule(
            self.neighbors.directory().refresh_interval(),
            Event::Timer(TimerKind::NeighborPurge),
        ));
        self.candidate_purge_timer = Some(self.scheduler.schedule(
            self.candidate_heads.directory().refresh_interval(),
            Event::Timer(TimerKind::CandidatePurge),
        ));
        info!(address = %self.own_address, "clustering engine started");
    }

    /// Cancel every pending timer and close out the connectable-time
    /// diagnostics.
    pub fn shutdown(&mut self) {
        let now = self.scheduler.now();
        if self.role != Role::Undecided {
            self.connectable_samples
                .push(now.saturating_sub(self.become_connectable_at));
        }
        for handle in [
            self.role_check_timer.take(),
            self.velocity_timer.take(),
            self.elect_timer.take(),
            self.empty_cluster_timer.take(),
            self.neighbor_purge_timer.take(),
            self.candidate_purge_timer.take(),
            self.member_purge_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.scheduler.cancel(handle);
        }
        info!(
            address = %self.own_address,
            samples = self.connectable_samples.len(),
            "clustering engine stopped"
        );
    }

    /// Reseed the engine's random stream for reproducible runs.
    pub fn assign_random_stream(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn on_interface_up(&mut self, interface: InterfaceId) {
        if !self.interfaces.contains(&interface) {
            debug!(?interface, "interface up");
            self.interfaces.push(interface);
        }
    }

    pub fn on_interface_down(&mut self, interface: InterfaceId) {
        debug!(?interface, "interface down");
        self.interfaces.retain(|i| *i != interface);
    }

    /// Delivery-failure notification from the transport, keyed by hardware
    /// address. Closes every matching directory record immediately.
    pub fn on_link_failure(&mut self, hardware: crate::core::message::HardwareAddress) {
        let now = self.scheduler.now();
        self.neighbors.directory_mut().mark_closed(now, hardware);
        self.candidate_heads.directory_mut().mark_closed(now, hardware);
    }

    /// Register a hardware-address resolution table with both peer
    /// scoreboards.
    pub fn add_resolution_table(&mut self, table: Rc<dyn ResolutionTable>) {
        self.neighbors
            .directory_mut()
            .add_resolution_table(Rc::clone(&table));
        self.candidate_heads.directory_mut().add_resolution_table(table);
    }

    pub fn set_default_role(&mut self, role: Role) {
        self.default_role = role;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn own_address(&self) -> NodeAddress {
        self.own_address
    }

    pub fn forwarding(&self) -> bool {
        self.forwarding
    }

    pub fn gateway(&self) -> Option<NodeAddress> {
        self.gateway
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn neighbors(&mut self) -> &mut NeighborScoreboard {
        &mut self.neighbors
    }

    pub fn candidate_heads(&mut self) -> &mut CandidateHeadScoreboard {
        &mut self.candidate_heads
    }

    pub fn members(&mut self) -> Option<&mut MemberRoster> {
        self.members.as_mut()
    }

    /// Durations this node spent in a connected (non-Undecided) role, for
    /// diagnostics only.
    pub fn connectable_samples(&self) -> &[Duration] {
        &self.connectable_samples
    }

    /// Deliver a due scheduled event.
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Timer(kind) => self.on_timer(kind),
            Event::Transmit {
                interface,
                destination,
                frame,
            } => {
                self.transport.send(interface, destination, &frame);
                Ok(())
            }
            Event::RegisterReply { to } => {
                self.send_register_reply(to);
                Ok(())
            }
        }
    }

    /// Transition the role state machine.
    ///
    /// An illegal transition is a protocol logic bug and surfaces as a
    /// fatal error; a same-role call is a no-op.
    pub fn set_role(&mut self, to: Role) -> Result<()> {
        let from = self.role;
        if from == to {
            return Ok(());
        }
        let legal = matches!(
            (from, to),
            (Role::Undecided, Role::ClusterMember | Role::MasterClusterHead)
                | (
                    Role::ClusterMember,
                    Role::Undecided | Role::SubClusterHead | Role::MasterClusterHead
                )
                | (
                    Role::SubClusterHead,
                    Role::Undecided | Role::ClusterMember | Role::MasterClusterHead
                )
                | (Role::MasterClusterHead, Role::Undecided | Role::ClusterMember)
        );
        if !legal {
            return Err(ProtocolError::InvalidRoleTransition { from, to });
        }

        let now = self.scheduler.now();
        info!(%from, %to, "role transition");

        if from == Role::MasterClusterHead {
            self.release_roster();
        }
        match to {
            Role::Undecided => {
                self.candidate_heads.clear_own_head();
                self.gateway = None;
                self.restart_election_timer();
                self.connectable_samples
                    .push(now.saturating_sub(self.become_connectable_at));
            }
            Role::MasterClusterHead => {
                self.ensure_roster();
                self.arm_empty_cluster_timer();
            }
            Role::ClusterMember | Role::SubClusterHead => {}
        }
        if from == Role::Undecided {
            self.become_connectable_at = now;
        }
        self.role = to;
        Ok(())
    }

    /// Decode and dispatch one received frame. Codec failures are fatal for
    /// the frame and propagate; reserved-but-valid kinds are ignored here.
    pub fn on_packet_received(&mut self, bytes: &[u8], sender: NodeAddress) -> Result<()> {
        let message = codec::decode(bytes)?;
        let now = self.scheduler.now();
        trace!(kind = ?message.kind(), from = %sender, "packet received");

        match message {
            Message::Hello(hello) => {
                self.neighbors
                    .update_from_hello(now, sender, self.config.neighbor_ttl, &hello);
                if let Some(roster) = self.members.as_mut() {
                    roster.refresh(now, sender, self.config.member_ttl, &hello);
                }
                if hello.role.is_head() {
                    self.candidate_heads.update_from_hello(
                        now,
                        self.config.alpha,
                        sender,
                        self.config.neighbor_ttl,
                        &hello,
                        self.position,
                        self.velocity,
                    );
                }
                Ok(())
            }
            Message::UndecidedAdv(adv) => {
                self.neighbors
                    .update_from_unadv(now, sender, self.config.neighbor_ttl, &adv);
                Ok(())
            }
            Message::MasterHeadAdv(adv) => {
                self.candidate_heads.update_from_adv(
                    now,
                    self.config.alpha,
                    self.config.neighbor_ttl,
                    &adv,
                    self.position,
                    self.velocity,
                );
                Ok(())
            }
            Message::ElectHead(ballot) => {
                if ballot.nominee == self.own_address && self.role != Role::MasterClusterHead {
                    info!("elected as master cluster head");
                    self.set_role(Role::MasterClusterHead)?;
                }
                Ok(())
            }
            Message::RegisterRequest(request) => {
                if self.role.is_head() && request.target == self.own_address {
                    // deferred so the admission runs outside this handler
                    self.scheduler.schedule(
                        Duration::ZERO,
                        Event::RegisterReply {
                            to: request.registrant,
                        },
                    );
                }
                Ok(())
            }
            Message::RegisterReply(_) => self.on_register_reply(now, sender),
            Message::HeadResign(resign) => {
                self.on_head_resign(now, resign.address);
                Ok(())
            }
            Message::SubHeadAdv(_) | Message::ClusterMemberAdv(_) => {
                trace!(kind = ?message.kind(), "reserved advertisement, no state change");
                Ok(())
            }
        }
    }

    fn on_register_reply(&mut self, now: Duration, sender: NodeAddress) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(ProtocolError::NotBound);
        }
        if !self.candidate_heads.set_own_head(now, &sender) {
            debug!(head = %sender, "register reply from untracked candidate ignored");
            return Ok(());
        }
        self.gateway = Some(sender);
        self.set_role(Role::ClusterMember)
    }

    fn on_head_resign(&mut self, now: Duration, resigned: NodeAddress) {
        let was_own_head = self.candidate_heads.is_own_head(&resigned);
        self.candidate_heads
            .remove_candidate(now, self.config.alpha, &resigned, self.velocity);
        if was_own_head {
            warn!(head = %resigned, "own cluster head resigned");
            self.candidate_heads.clear_own_head();
            self.gateway = None;
            self.intercluster_handover();
        }
        if let Some(roster) = self.members.as_mut() {
            roster.remove(now, &resigned);
        }
    }

    fn on_timer(&mut self, kind: TimerKind) -> Result<()> {
        match kind {
            TimerKind::RoleCheck => self.on_role_check(),
            TimerKind::VelocityCheck => {
                self.sample_velocity();
                self.velocity_timer = Some(self.scheduler.schedule(
                    self.config.velocity_check_interval,
                    Event::Timer(TimerKind::VelocityCheck),
                ));
                Ok(())
            }
            TimerKind::ElectHead => self.on_elect_head(),
            TimerKind::EmptyCluster => self.on_empty_cluster(),
            TimerKind::NeighborPurge => {
                let now = self.scheduler.now();
                self.neighbors.directory_mut().purge(now);
                self.neighbor_purge_timer = Some(self.scheduler.schedule(
                    self.neighbors.directory().refresh_interval(),
                    Event::Timer(TimerKind::NeighborPurge),
                ));
                Ok(())
            }
            TimerKind::CandidatePurge => {
                let now = self.scheduler.now();
                self.candidate_heads.directory_mut().purge(now);
                self.candidate_purge_timer = Some(self.scheduler.schedule(
                    self.candidate_heads.directory().refresh_interval(),
                    Event::Timer(TimerKind::CandidatePurge),
                ));
                Ok(())
            }
            TimerKind::MemberPurge => {
                let now = self.scheduler.now();
                match self.members.as_mut() {
                    Some(roster) => {
                        roster.directory_mut().purge(now);
                        let refresh = roster.directory().refresh_interval();
                        self.member_purge_timer = Some(
                            self.scheduler
                                .schedule(refresh, Event::Timer(TimerKind::MemberPurge)),
                        );
                    }
                    // roster released since the timer was armed
                    None => self.member_purge_timer = None,
                }
                Ok(())
            }
        }
    }

    /// Beacon plus per-role housekeeping; the heartbeat of the protocol.
    fn on_role_check(&mut self) -> Result<()> {
        let now = self.scheduler.now();
        self.send_hello(now);

        match self.role {
            Role::Undecided => {
                self.forwarding = false;
                if self.default_role != Role::Undecided {
                    self.set_role(self.default_role)?;
                } else if let Some(target) = self.candidate_heads.lowest_rpm(now) {
                    debug!(head = %target, "requesting registration");
                    self.enqueue_send(
                        target,
                        &Message::RegisterRequest(RegisterRequest {
                            target,
                            registrant: self.own_address,
                        }),
                    );
                }
            }
            Role::ClusterMember | Role::SubClusterHead => self.intercluster_handover(),
            Role::MasterClusterHead => {
                self.candidate_heads.clear_own_head();
                self.forwarding = true;
                self.ensure_roster();
                let occupied = self
                    .members
                    .as_mut()
                    .map(|m| !m.is_empty(now))
                    .unwrap_or(false);
                if occupied {
                    self.arm_empty_cluster_timer();
                }
            }
        }

        self.role_check_timer = Some(self.scheduler.schedule(
            self.config.role_check_interval,
            Event::Timer(TimerKind::RoleCheck),
        ));
        Ok(())
    }

    /// Broadcast an election ballot naming the lowest-RPM neighbor. Only
    /// acts while Undecided but always reschedules.
    fn on_elect_head(&mut self) -> Result<()> {
        let now = self.scheduler.now();
        if self.role == Role::Undecided {
            if let Some(nominee) = self.neighbors.lowest_rpm(now) {
                debug!(nominee = %nominee, "broadcasting election ballot");
                self.enqueue_send(
                    NodeAddress::BROADCAST,
                    &Message::ElectHead(ElectHead { nominee }),
                );
            }
        }
        self.elect_timer = Some(
            self.scheduler
                .schedule(self.config.elect_interval(), Event::Timer(TimerKind::ElectHead)),
        );
        Ok(())
    }

    /// Single-shot: a head whose roster is still empty resigns. Re-armed by
    /// the role check whenever the roster is occupied, never by itself.
    fn on_empty_cluster(&mut self) -> Result<()> {
        self.empty_cluster_timer = None;
        let now = self.scheduler.now();
        let empty = self
            .members
            .as_mut()
            .map(|m| m.is_empty(now))
            .unwrap_or(true);
        if (self.role == Role::SubClusterHead || self.role == Role::MasterClusterHead) && empty {
            info!("cluster stayed empty, resigning");
            self.enqueue_send(
                NodeAddress::BROADCAST,
                &Message::HeadResign(HeadResign {
                    address: self.own_address,
                }),
            );
            self.set_role(Role::Undecided)?;
        }
        Ok(())
    }

    /// Estimate velocity from consecutive mobility samples.
    fn sample_velocity(&mut self) {
        let now = self.scheduler.now();
        let position = self.mobility.current_position();
        let elapsed = now.saturating_sub(self.last_sample_at).as_secs_f64();
        if elapsed > 0.0 {
            self.velocity = (position - self.position) / elapsed;
        }
        self.position = position;
        self.last_sample_at = now;
    }

    /// Re-register with the best-scored candidate head when it differs from
    /// the current one. Fire-and-forget: the node is effectively head-less
    /// until the new head replies, and the next role check retries.
    fn intercluster_handover(&mut self) {
        let now = self.scheduler.now();
        let own = self.candidate_heads.own_head().map(|r| r.address);
        let Some(best) = self.candidate_heads.best_head(now) else {
            return;
        };
        if Some(best) == own {
            return;
        }
        info!(old = ?own.map(|a| a.to_string()), new = %best, "inter-cluster handover");
        if let Some(old) = own {
            self.enqueue_send(
                old,
                &Message::HeadResign(HeadResign {
                    address: self.own_address,
                }),
            );
        }
        self.enqueue_send(
            best,
            &Message::RegisterRequest(RegisterRequest {
                target: best,
                registrant: self.own_address,
            }),
        );
    }

    fn send_hello(&mut self, now: Duration) {
        let rpm = self.neighbors.relative_position_and_mobility(
            self.config.alpha,
            self.position,
            self.velocity,
        );
        let rsm = self.candidate_heads.own_head().map(|r| r.rsm).unwrap_or(0.0);
        let member_count = self.members.as_mut().map(|m| m.count(now)).unwrap_or(0) as u32;
        self.enqueue_send(
            NodeAddress::BROADCAST,
            &Message::Hello(Hello {
                address: self.own_address,
                position: self.position,
                velocity: self.velocity,
                rpm,
                rsm,
                role: self.role,
                member_count,
            }),
        );
    }

    fn send_register_reply(&mut self, to: NodeAddress) {
        let now = self.scheduler.now();
        self.ensure_roster();
        if let Some(roster) = self.members.as_mut() {
            roster.admit(now, to, self.config.member_ttl);
        }
        self.enqueue_send(
            to,
            &Message::RegisterReply(RegisterReply {
                head_address: self.own_address,
            }),
        );
    }

    /// Fan an encoded frame out over every bound interface, each send
    /// staggered to desynchronize simultaneous transmissions.
    fn enqueue_send(&mut self, destination: NodeAddress, message: &Message) {
        let frame = codec::encode(message);
        for (index, interface) in self.interfaces.iter().enumerate() {
            self.scheduler.schedule(
                SEND_STAGGER * index as u32,
                Event::Transmit {
                    interface: *interface,
                    destination,
                    frame: frame.clone(),
                },
            );
        }
    }

    fn ensure_roster(&mut self) {
        if self.members.is_none() {
            debug!("allocating member roster");
            self.members = Some(MemberRoster::new(self.config.hello_interval));
            self.member_purge_timer = Some(self.scheduler.schedule(
                self.config.hello_interval,
                Event::Timer(TimerKind::MemberPurge),
            ));
        }
    }

    fn release_roster(&mut self) {
        if self.members.take().is_some() {
            debug!("releasing member roster");
        }
        if let Some(handle) = self.member_purge_timer.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = self.empty_cluster_timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn restart_election_timer(&mut self) {
        if let Some(handle) = self.elect_timer.take() {
            self.scheduler.cancel(handle);
        }
        self.elect_timer = Some(
            self.scheduler
                .schedule(self.config.elect_interval(), Event::Timer(TimerKind::ElectHead)),
        );
    }

    fn arm_empty_cluster_timer(&mut self) {
        if let Some(handle) = self.empty_cluster_timer.take() {
            self.scheduler.cancel(handle);
        }
        self.empty_cluster_timer = Some(self.scheduler.schedule(
            self.config.contention_interval(),
            Event::Timer(TimerKind::EmptyCluster),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn addr(tag: u8) -> NodeAddress {
        let mut bytes = [0u8; 16];
        bytes[15] = tag;
        NodeAddress(bytes)
    }

    #[derive(Default)]
    struct ClockInner {
        now: Duration,
        next_handle: u64,
        scheduled: Vec<(TimerHandle, Duration, Event)>,
    }

    /// Manual clock: tests inspect the queue and feed events back by hand.
    #[derive(Default)]
    struct ManualClock {
        inner: RefCell<ClockInner>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.inner.borrow_mut().now += by;
        }

        fn scheduled_events(&self) -> Vec<Event> {
            self.inner
                .borrow()
                .scheduled
                .iter()
                .map(|(_, _, e)| e.clone())
                .collect()
        }

        fn drain(&self) -> Vec<Event> {
            let mut inner = self.inner.borrow_mut();
            inner.scheduled.drain(..).map(|(_, _, e)| e).collect()
        }
    }

    impl Scheduler for ManualClock {
        fn now(&self) -> Duration {
            self.inner.borrow().now
        }

        fn schedule(&self, after: Duration, event: Event) -> TimerHandle {
            let mut inner = self.inner.borrow_mut();
            inner.next_handle += 1;
            let handle = TimerHandle(inner.next_handle);
            let due = inner.now + after;
            inner.scheduled.push((handle, due, event));
            handle
        }

        fn cancel(&self, handle: TimerHandle) {
            self.inner
                .borrow_mut()
                .scheduled
                .retain(|(h, _, _)| *h != handle);
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: RefCell<Vec<(InterfaceId, NodeAddress, Vec<u8>)>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, interface: InterfaceId, destination: NodeAddress, frame: &[u8]) {
            self.sent
                .borrow_mut()
                .push((interface, destination, frame.to_vec()));
        }
    }

    struct FixedMobility(Vec2);

    impl MobilitySource for FixedMobility {
        fn current_position(&self) -> Vec2 {
            self.0
        }
    }

    struct Harness {
        clock: Rc<ManualClock>,
        transport: Rc<RecordingTransport>,
        engine: Engine,
    }

    fn harness() -> Harness {
        let clock = Rc::new(ManualClock::default());
        let transport = Rc::new(RecordingTransport::default());
        let mobility = Rc::new(FixedMobility(Vec2::ZERO));
        let mut engine = Engine::builder(addr(1))
            .scheduler(Rc::clone(&clock) as Rc<dyn Scheduler>)
            .transport(Rc::clone(&transport) as Rc<dyn Transport>)
            .mobility(mobility as Rc<dyn MobilitySource>)
            .build()
            .expect("engine builds");
        engine.on_interface_up(InterfaceId(0));
        Harness {
            clock,
            transport,
            engine,
        }
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = Engine::builder(addr(1)).build().unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigError(_)));
    }

    #[test]
    fn test_role_transition_table() {
        let mut h = harness();
        assert!(matches!(
            h.engine.set_role(Role::SubClusterHead),
            Err(ProtocolError::InvalidRoleTransition {
                from: Role::Undecided,
                to: Role::SubClusterHead,
            })
        ));
        assert_eq!(h.engine.role(), Role::Undecided);

        h.engine.set_role(Role::MasterClusterHead).expect("legal");
        assert!(h.engine.members().is_some());

        assert!(matches!(
            h.engine.set_role(Role::SubClusterHead),
            Err(ProtocolError::InvalidRoleTransition { .. })
        ));

        h.engine.set_role(Role::ClusterMember).expect("legal");
        assert!(h.engine.members().is_none());

        h.engine.set_role(Role::Undecided).expect("legal");
        // same-role transition is a no-op, not a fatal error
        h.engine.set_role(Role::Undecided).expect("no-op");
    }

    #[test]
    fn test_promotion_arms_empty_cluster_timer() {
        let mut h = harness();
        h.engine.set_role(Role::MasterClusterHead).expect("legal");
        assert!(h
            .clock
            .scheduled_events()
            .contains(&Event::Timer(TimerKind::EmptyCluster)));
    }

    #[test]
    fn test_election_ballot_names_self() {
        let mut h = harness();
        h.engine.set_role(Role::MasterClusterHead).expect("legal");
        // a stray ballot naming an already elected head changes nothing
        let ballot = codec::encode(&Message::ElectHead(ElectHead { nominee: addr(1) }));
        h.engine.on_packet_received(&ballot, addr(2)).expect("ok");
        assert_eq!(h.engine.role(), Role::MasterClusterHead);
    }

    #[test]
    fn test_register_reply_requires_bound_interface() {
        let mut h = harness();
        h.engine.on_interface_down(InterfaceId(0));
        let reply = codec::encode(&Message::RegisterReply(RegisterReply {
            head_address: addr(2),
        }));
        let err = h.engine.on_packet_received(&reply, addr(2)).unwrap_err();
        assert!(matches!(err, ProtocolError::NotBound));
    }

    #[test]
    fn test_register_reply_from_unknown_candidate_ignored() {
        let mut h = harness();
        let reply = codec::encode(&Message::RegisterReply(RegisterReply {
            head_address: addr(2),
        }));
        h.engine.on_packet_received(&reply, addr(2)).expect("ok");
        assert_eq!(h.engine.role(), Role::Undecided);
        assert_eq!(h.engine.gateway(), None);
    }

    #[test]
    fn test_transmit_event_reaches_transport() {
        let mut h = harness();
        let frame = codec::encode(&Message::ElectHead(ElectHead { nominee: addr(2) }));
        h.engine
            .handle_event(Event::Transmit {
                interface: InterfaceId(0),
                destination: addr(3),
                frame: frame.clone(),
            })
            .expect("ok");
        let sent = h.transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (InterfaceId(0), addr(3), frame));
    }

    #[test]
    fn test_register_request_admits_member() {
        let mut h = harness();
        h.engine.set_role(Role::MasterClusterHead).expect("legal");
        h.clock.drain();

        let request = codec::encode(&Message::RegisterRequest(RegisterRequest {
            target: addr(1),
            registrant: addr(5),
        }));
        h.engine.on_packet_received(&request, addr(5)).expect("ok");

        // the admission and its transmission are deferred through the
        // scheduler; pump until quiescent
        loop {
            let events = h.clock.drain();
            if events.is_empty() {
                break;
            }
            for event in events {
                h.engine.handle_event(event).expect("ok");
            }
        }
        let now = h.clock.now();
        assert!(h.engine.members().expect("roster").contains(now, &addr(5)));

        // the unicast reply went out to the registrant
        let sent = h.transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, addr(5));
        let reply = codec::decode(&sent[0].2).expect("decodes");
        assert_eq!(
            reply,
            Message::RegisterReply(RegisterReply {
                head_address: addr(1),
            })
        );
    }

    #[test]
    fn test_register_request_for_other_target_ignored() {
        let mut h = harness();
        h.engine.set_role(Role::MasterClusterHead).expect("legal");
        h.clock.drain();

        let request = codec::encode(&Message::RegisterRequest(RegisterRequest {
            target: addr(9),
            registrant: addr(5),
        }));
        h.engine.on_packet_received(&request, addr(5)).expect("ok");
        assert!(h.clock.scheduled_events().is_empty());
    }

    #[test]
    fn test_register_request_guarded_by_head_role() {
        let mut h = harness();
        let request = codec::encode(&Message::RegisterRequest(RegisterRequest {
            target: addr(1),
            registrant: addr(5),
        }));
        h.engine.on_packet_received(&request, addr(5)).expect("ok");
        assert!(h.clock.scheduled_events().is_empty());
    }

    #[test]
    fn test_connectable_sampling() {
        let mut h = harness();
        h.engine.set_role(Role::MasterClusterHead).expect("legal");
        h.clock.advance(Duration::from_secs(3));
        h.engine.set_role(Role::Undecided).expect("legal");
        assert_eq!(h.engine.connectable_samples(), &[Duration::from_secs(3)]);
    }

    #[test]
    fn test_velocity_estimation() {
        let clock = Rc::new(ManualClock::default());
        let transport = Rc::new(RecordingTransport::default());
        let mobility = Rc::new(RefCell::new(Vec2::ZERO));

        struct SharedMobility(Rc<RefCell<Vec2>>);
        impl MobilitySource for SharedMobility {
            fn current_position(&self) -> Vec2 {
                *self.0.borrow()
            }
        }

        let mut engine = Engine::builder(addr(1))
            .scheduler(Rc::clone(&clock) as Rc<dyn Scheduler>)
            .transport(transport as Rc<dyn Transport>)
            .mobility(Rc::new(SharedMobility(Rc::clone(&mobility))) as Rc<dyn MobilitySource>)
            .build()
            .expect("engine builds");
        engine.start();

        *mobility.borrow_mut() = Vec2::new(10.0, 0.0);
        clock.advance(Duration::from_millis(100));
        engine
            .handle_event(Event::Timer(TimerKind::VelocityCheck))
            .expect("ok");
        assert_eq!(engine.velocity(), Vec2::new(100.0, 0.0));
        assert_eq!(engine.position(), Vec2::new(10.0, 0.0));
    }
}
