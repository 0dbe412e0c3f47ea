//! # Expiring Peer Directories
//!
//! Time-bounded registries of peer records with purge-on-access and
//! pluggable scoring.
//!
//! One generic directory type, [`ExpiringDirectory`], backs three
//! specializations:
//! - [`neighbors::NeighborScoreboard`]: one-hop neighbors, RPM scoring
//! - [`heads::CandidateHeadScoreboard`]: known cluster-head candidates and
//!   the node's own head, RSM scoring
//! - [`members::MemberRoster`]: nodes registered with this node as head,
//!   unscored
//!
//! Records are kept in insertion order; that order is the deterministic
//! tie-break for every best-by-score query. A directory is owned exclusively
//! by the node that created it and is never shared across nodes.

pub mod heads;
pub mod members;
pub mod neighbors;

use crate::core::message::{HardwareAddress, NodeAddress, Role};
use crate::utils::geometry::Vec2;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

pub use heads::{classify_proximity, CandidateHeadScoreboard, ProximityState};
pub use members::MemberRoster;
pub use neighbors::NeighborScoreboard;

/// Hardware-address resolution collaborator. A directory may hold several
/// tables; the first non-incomplete result wins.
pub trait ResolutionTable {
    /// Resolve a network address to its link-layer address. `None` means
    /// the table has no complete entry for the address.
    fn lookup(&self, address: &NodeAddress) -> Option<HardwareAddress>;
}

/// Callback invoked for every record removed by a purge.
pub type LinkFailureCallback = Box<dyn FnMut(NodeAddress)>;

/// Direction for [`ExpiringDirectory::best_by_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDirection {
    Min,
    Max,
}

/// One tracked peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub address: NodeAddress,
    pub hardware: Option<HardwareAddress>,
    /// Absolute expiry; only ever moves forward on update.
    pub expire_at: Duration,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rpm: f64,
    pub rsm: f64,
    pub proximity: ProximityState,
    pub role: Role,
    /// Set by a transport delivery-failure signal; marks the record for
    /// removal regardless of `expire_at`.
    pub closed: bool,
}

impl PeerRecord {
    fn new(address: NodeAddress, hardware: Option<HardwareAddress>, expire_at: Duration) -> Self {
        PeerRecord {
            address,
            hardware,
            expire_at,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            rpm: 1.0,
            rsm: 0.0,
            proximity: ProximityState::Far,
            role: Role::Undecided,
            closed: false,
        }
    }

    fn is_stale(&self, now: Duration) -> bool {
        self.expire_at < now || self.closed
    }
}

/// Insertion-ordered, time-bounded registry of [`PeerRecord`]s.
///
/// Every read operation purges first, so callers never observe a record that
/// is expired or closed. Scoring is left to the specializations: `upsert`
/// hands the record to a caller-supplied closure and reports whether the
/// address was newly inserted, which is the trigger for full rescoring where
/// a scoreboard needs it.
pub struct ExpiringDirectory {
    records: Vec<PeerRecord>,
    resolvers: Vec<Rc<dyn ResolutionTable>>,
    on_link_failure: Option<LinkFailureCallback>,
    refresh_interval: Duration,
}

impl ExpiringDirectory {
    pub fn new(refresh_interval: Duration) -> Self {
        ExpiringDirectory {
            records: Vec::new(),
            resolvers: Vec::new(),
            on_link_failure: None,
            refresh_interval,
        }
    }

    /// Interval at which the owner should drive periodic purges.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn add_resolution_table(&mut self, table: Rc<dyn ResolutionTable>) {
        self.resolvers.push(table);
    }

    pub fn remove_resolution_table(&mut self, table: &Rc<dyn ResolutionTable>) {
        self.resolvers.retain(|t| !Rc::ptr_eq(t, table));
    }

    /// Register a callback invoked once per address removed by a purge,
    /// before the removal happens.
    pub fn set_link_failure_callback(&mut self, callback: LinkFailureCallback) {
        self.on_link_failure = Some(callback);
    }

    /// First complete resolution across all registered tables.
    fn resolve(&self, address: &NodeAddress) -> Option<HardwareAddress> {
        self.resolvers.iter().find_map(|t| t.lookup(address))
    }

    /// Drop every record that is expired or closed. Safe on an empty
    /// directory.
    pub fn purge(&mut self, now: Duration) {
        if self.records.is_empty() {
            return;
        }
        if let Some(callback) = self.on_link_failure.as_mut() {
            for record in self.records.iter().filter(|r| r.is_stale(now)) {
                debug!(address = %record.address, "link closed");
                callback(record.address);
            }
        }
        self.records.retain(|r| !r.is_stale(now));
    }

    /// Insert or refresh a record.
    ///
    /// An existing record has its expiry extended by the max rule
    /// (`max(old, now + ttl)`) and is then handed to `fill` for field and
    /// score updates. A new record is created with `expire_at = now + ttl`
    /// and a hardware address resolved across the registered tables, handed
    /// to `fill`, appended, and followed by a purge.
    ///
    /// Returns `true` if the address was newly inserted.
    pub fn upsert<F>(&mut self, now: Duration, address: NodeAddress, ttl: Duration, fill: F) -> bool
    where
        F: FnOnce(&mut PeerRecord),
    {
        if let Some(record) = self.records.iter_mut().find(|r| r.address == address) {
            trace!(address = %address, "refreshing entry");
            record.expire_at = record.expire_at.max(now + ttl);
            fill(record);
            return false;
        }

        debug!(address = %address, "open link");
        let mut record = PeerRecord::new(address, self.resolve(&address), now + ttl);
        fill(&mut record);
        self.records.push(record);
        self.purge(now);
        true
    }

    /// Membership test; purges first.
    pub fn contains(&mut self, now: Duration, address: &NodeAddress) -> bool {
        self.purge(now);
        self.records.iter().any(|r| r.address == *address)
    }

    /// Remove one record. Returns `false` if the address is not present.
    pub fn remove(&mut self, now: Duration, address: &NodeAddress) -> bool {
        self.purge(now);
        let before = self.records.len();
        self.records.retain(|r| r.address != *address);
        before != self.records.len()
    }

    /// Remaining lifetime of a record; zero if absent.
    pub fn expire_time_remaining(&mut self, now: Duration, address: &NodeAddress) -> Duration {
        self.purge(now);
        self.records
            .iter()
            .find(|r| r.address == *address)
            .map(|r| r.expire_at.saturating_sub(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Number of live records; purges first.
    pub fn count(&mut self, now: Duration) -> usize {
        self.purge(now);
        self.records.len()
    }

    pub fn is_empty(&mut self, now: Duration) -> bool {
        self.count(now) == 0
    }

    /// Address of the best-scored record by `key` in the given direction.
    ///
    /// The scan uses strict comparison, so the earliest-inserted record wins
    /// any tie. Returns `None` on an empty directory (after purge).
    pub fn best_by_score<K>(
        &mut self,
        now: Duration,
        direction: ScoreDirection,
        key: K,
    ) -> Option<NodeAddress>
    where
        K: Fn(&PeerRecord) -> f64,
    {
        self.purge(now);
        let mut best: Option<&PeerRecord> = None;
        for record in &self.records {
            let beats = match (&best, direction) {
                (None, _) => true,
                (Some(b), ScoreDirection::Min) => key(record) < key(b),
                (Some(b), ScoreDirection::Max) => key(record) > key(b),
            };
            if beats {
                best = Some(record);
            }
        }
        best.map(|r| r.address)
    }

    /// Mark every record carrying the failed hardware address as closed and
    /// purge immediately.
    pub fn mark_closed(&mut self, now: Duration, hardware: HardwareAddress) {
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.hardware == Some(hardware))
        {
            debug!(address = %record.address, %hardware, "delivery failure, closing record");
            record.closed = true;
        }
        self.purge(now);
    }

    /// Live records in insertion order. Does not purge; callers that need
    /// purge-on-read semantics go through the query methods above.
    pub fn records(&self) -> &[PeerRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [PeerRecord] {
        &mut self.records
    }

    pub fn get(&self, address: &NodeAddress) -> Option<&PeerRecord> {
        self.records.iter().find(|r| r.address == *address)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
