//! Candidate-Head Scoreboard: tracked cluster-head candidates scored by
//! Relative State and Mobility (RSM), plus the node's own-head slot.
//!
//! Lower RSM is better: the candidate's proximity state is close to the best
//! available and its speed relative to this node is low. RSM denominators
//! depend on the whole candidate set, so any membership change triggers a
//! full rescoring pass.

use crate::config::{PROXIMITY_FAR_THRESHOLD, PROXIMITY_NEAR_THRESHOLD};
use crate::core::message::{Hello, MasterHeadAdv, NodeAddress, Role};
use crate::directory::{ExpiringDirectory, PeerRecord, ScoreDirection};
use crate::utils::geometry::Vec2;
use std::time::Duration;
use tracing::{debug, trace};

/// Discretized relative-motion classification between this node and a
/// candidate head. The ordering is semantically meaningful: greater means
/// more reachable, and max/compare operations rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u32)]
pub enum ProximityState {
    #[default]
    Far = 0,
    Depart = 1,
    Approach = 2,
    Near = 3,
}

/// Classify the relative motion of a candidate with respect to this node.
///
/// `d` is the magnitude of the combined (relative position, relative
/// velocity) 4-component vector, `p` the magnitude of the relative position
/// alone. The thresholds are protocol constants.
pub fn classify_proximity(relative_position: Vec2, relative_velocity: Vec2) -> ProximityState {
    let d = relative_position.joint_magnitude(relative_velocity);
    let p = relative_position.magnitude();
    if d < PROXIMITY_NEAR_THRESHOLD {
        ProximityState::Near
    } else if d > PROXIMITY_FAR_THRESHOLD {
        ProximityState::Far
    } else if d > p {
        ProximityState::Depart
    } else {
        ProximityState::Approach
    }
}

pub struct CandidateHeadScoreboard {
    directory: ExpiringDirectory,
    own_head: Option<PeerRecord>,
}

impl CandidateHeadScoreboard {
    pub fn new(refresh_interval: Duration) -> Self {
        CandidateHeadScoreboard {
            directory: ExpiringDirectory::new(refresh_interval),
            own_head: None,
        }
    }

    /// Refresh a candidate from a Hello announcing a head role.
    pub fn update_from_hello(
        &mut self,
        now: Duration,
        alpha: f64,
        source: NodeAddress,
        ttl: Duration,
        hello: &Hello,
        self_position: Vec2,
        self_velocity: Vec2,
    ) {
        let proximity = classify_proximity(
            hello.position - self_position,
            hello.velocity - self_velocity,
        );
        self.directory.upsert(now, source, ttl, |record| {
            record.position = hello.position;
            record.velocity = hello.velocity;
            record.rpm = hello.rpm;
            record.role = hello.role;
            record.proximity = proximity;
        });
        self.rescore(alpha, self_velocity);
    }

    /// Refresh a candidate from a MasterHeadAdv, keyed by the announced head
    /// address rather than the packet's transport source.
    pub fn update_from_adv(
        &mut self,
        now: Duration,
        alpha: f64,
        ttl: Duration,
        adv: &MasterHeadAdv,
        self_position: Vec2,
        self_velocity: Vec2,
    ) {
        let proximity = classify_proximity(
            adv.position - self_position,
            adv.velocity - self_velocity,
        );
        self.directory.upsert(now, adv.head_address, ttl, |record| {
            record.position = adv.position;
            record.velocity = adv.velocity;
            record.rpm = adv.rpm;
            record.role = Role::MasterClusterHead;
            record.proximity = proximity;
        });
        self.rescore(alpha, self_velocity);
    }

    /// Drop a candidate, typically on a HeadResign. Returns `false` if the
    /// address was not tracked.
    pub fn remove_candidate(
        &mut self,
        now: Duration,
        alpha: f64,
        address: &NodeAddress,
        self_velocity: Vec2,
    ) -> bool {
        let removed = self.directory.remove(now, address);
        if removed {
            self.rescore(alpha, self_velocity);
        }
        removed
    }

    /// RSM of one tracked candidate relative to this node.
    ///
    /// `state` is the proximity state of the candidate with respect to this
    /// node. An empty scoreboard scores 1.0; when the best proximity state
    /// across all candidates is Far there is no usable candidate yet and
    /// every query scores the 2.0 sentinel. A zero `highestRelSpeed`
    /// denominator makes the speed term contribute 0.
    pub fn relative_state_and_mobility(
        &self,
        alpha: f64,
        state: ProximityState,
        self_velocity: Vec2,
        candidate: &NodeAddress,
    ) -> f64 {
        let records = self.directory.records();
        if records.is_empty() {
            return 1.0;
        }
        let best = records
            .iter()
            .map(|r| r.proximity)
            .max()
            .unwrap_or(ProximityState::Far);
        if best == ProximityState::Far {
            return 2.0;
        }

        let highest_rel_speed = records
            .iter()
            .map(|r| (r.velocity - self_velocity).magnitude())
            .fold(0.0_f64, f64::max);
        let rel_speed = self
            .directory
            .get(candidate)
            .map(|r| (r.velocity - self_velocity).magnitude())
            .unwrap_or(0.0);

        let state_term = (best as u32 as f64 - state as u32 as f64) / best as u32 as f64;
        let speed_term = if highest_rel_speed > 0.0 {
            rel_speed / highest_rel_speed
        } else {
            0.0
        };
        let rsm = alpha * state_term + (1.0 - alpha) * speed_term;
        trace!(candidate = %candidate, rsm, ?state, ?best, rel_speed, "rsm computed");
        rsm
    }

    /// Recompute the stored RSM of every tracked candidate. The own-head
    /// copy is refreshed from the live record when it is still tracked.
    fn rescore(&mut self, alpha: f64, self_velocity: Vec2) {
        let scores: Vec<f64> = self
            .directory
            .records()
            .iter()
            .map(|r| {
                self.relative_state_and_mobility(alpha, r.proximity, self_velocity, &r.address)
            })
            .collect();
        for (record, rsm) in self.directory.records_mut().iter_mut().zip(scores) {
            record.rsm = rsm;
        }
        if let Some(own) = &self.own_head {
            if let Some(live) = self.directory.get(&own.address) {
                self.own_head = Some(live.clone());
            }
        }
    }

    /// Make a tracked candidate this node's own cluster head. Fails without
    /// state change if the address is unknown.
    pub fn set_own_head(&mut self, now: Duration, address: &NodeAddress) -> bool {
        self.directory.purge(now);
        match self.directory.get(address) {
            Some(record) => {
                debug!(head = %address, "own cluster head set");
                self.own_head = Some(record.clone());
                true
            }
            None => {
                debug!(head = %address, "own head rejected, unknown candidate");
                false
            }
        }
    }

    pub fn clear_own_head(&mut self) {
        if let Some(own) = self.own_head.take() {
            debug!(head = %own.address, "own cluster head cleared");
        }
    }

    pub fn own_head(&self) -> Option<&PeerRecord> {
        self.own_head.as_ref()
    }

    pub fn is_own_head(&self, address: &NodeAddress) -> bool {
        self.own_head.as_ref().map(|r| r.address) == Some(*address)
    }

    /// Candidate with the minimum RSM. The own-head slot is the initial
    /// accumulator and the scan uses strict-less comparison, so the own head
    /// wins ties against every tracked candidate.
    pub fn best_head(&mut self, now: Duration) -> Option<NodeAddress> {
        self.directory.purge(now);
        let mut best: Option<(NodeAddress, f64)> =
            self.own_head.as_ref().map(|r| (r.address, r.rsm));
        for record in self.directory.records() {
            let beats = match best {
                None => true,
                Some((_, rsm)) => record.rsm < rsm,
            };
            if beats {
                best = Some((record.address, record.rsm));
            }
        }
        best.map(|(address, _)| address)
    }

    /// Candidate with the lowest RPM, the registration target for an
    /// undecided node.
    pub fn lowest_rpm(&mut self, now: Duration) -> Option<NodeAddress> {
        self.directory.best_by_score(now, ScoreDirection::Min, |r| r.rpm)
    }

    pub fn contains(&mut self, now: Duration, address: &NodeAddress) -> bool {
        self.directory.contains(now, address)
    }

    pub fn count(&mut self, now: Duration) -> usize {
        self.directory.count(now)
    }

    pub fn is_empty(&mut self, now: Duration) -> bool {
        self.directory.is_empty(now)
    }

    pub fn directory(&self) -> &ExpiringDirectory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut ExpiringDirectory {
        &mut self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> NodeAddress {
        let mut bytes = [0u8; 16];
        bytes[15] = tag;
        NodeAddress(bytes)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn hello_head(position: Vec2, velocity: Vec2) -> Hello {
        Hello {
            position,
            velocity,
            role: Role::MasterClusterHead,
            ..Hello::default()
        }
    }

    #[test]
    fn test_proximity_near() {
        let state = classify_proximity(Vec2::new(40.0, 0.0), Vec2::ZERO);
        assert_eq!(state, ProximityState::Near);
    }

    #[test]
    fn test_proximity_far() {
        let state = classify_proximity(Vec2::new(120.0, 0.0), Vec2::ZERO);
        assert_eq!(state, ProximityState::Far);
    }

    #[test]
    fn test_proximity_depart_and_approach() {
        // velocity inflates the joint magnitude above the position alone
        let state = classify_proximity(Vec2::new(60.0, 0.0), Vec2::new(30.0, 0.0));
        assert_eq!(state, ProximityState::Depart);
        // no relative velocity: joint magnitude equals the position magnitude
        let state = classify_proximity(Vec2::new(60.0, 0.0), Vec2::ZERO);
        assert_eq!(state, ProximityState::Approach);
    }

    #[test]
    fn test_proximity_ordering() {
        assert!(ProximityState::Far < ProximityState::Depart);
        assert!(ProximityState::Depart < ProximityState::Approach);
        assert!(ProximityState::Approach < ProximityState::Near);
    }

    #[test]
    fn test_rsm_empty_scores_one() {
        let board = CandidateHeadScoreboard::new(secs(1));
        let rsm = board.relative_state_and_mobility(
            0.5,
            ProximityState::Near,
            Vec2::ZERO,
            &addr(1),
        );
        assert_eq!(rsm, 1.0);
    }

    #[test]
    fn test_rsm_all_far_scores_sentinel() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(200.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        assert_eq!(
            board.directory().get(&addr(1)).expect("entry").proximity,
            ProximityState::Far
        );
        assert_eq!(board.directory().get(&addr(1)).expect("entry").rsm, 2.0);
    }

    #[test]
    fn test_rsm_best_candidate_scores_zero() {
        // one stationary candidate nearby: state term 0 (it is the best
        // state) and speed term 0 (zero relative speed)
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        assert_eq!(board.directory().get(&addr(1)).expect("entry").rsm, 0.0);
    }

    #[test]
    fn test_rsm_state_term() {
        // addr(1) Near (best), addr(2) Approach, both zero relative speed:
        // addr(2) scores alpha * (3 - 2) / 3
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        board.update_from_hello(
            secs(0),
            0.5,
            addr(2),
            secs(5),
            &hello_head(Vec2::new(80.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        let entry = board.directory().get(&addr(2)).expect("entry");
        assert_eq!(entry.proximity, ProximityState::Approach);
        assert!((entry.rsm - 0.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_new_candidate_rescores_existing_entries() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(80.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        // alone, Approach is the best state and scores 0
        assert_eq!(board.directory().get(&addr(1)).expect("entry").rsm, 0.0);

        // a Near candidate appears; the old entry's state term rises
        board.update_from_hello(
            secs(0),
            0.5,
            addr(2),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        let entry = board.directory().get(&addr(1)).expect("entry");
        assert!((entry.rsm - 0.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_removal_rescores_remaining_entries() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(80.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        board.update_from_hello(
            secs(0),
            0.5,
            addr(2),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        assert!(board.remove_candidate(secs(0), 0.5, &addr(2), Vec2::ZERO));
        // with the Near candidate gone, Approach is best again
        assert_eq!(board.directory().get(&addr(1)).expect("entry").rsm, 0.0);
        assert!(!board.remove_candidate(secs(0), 0.5, &addr(2), Vec2::ZERO));
    }

    #[test]
    fn test_adv_keys_by_announced_head_address() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        let adv = MasterHeadAdv {
            position: Vec2::new(10.0, 0.0),
            velocity: Vec2::ZERO,
            rpm: 0.3,
            head_address: addr(7),
        };
        board.update_from_adv(secs(0), 0.5, secs(5), &adv, Vec2::ZERO, Vec2::ZERO);
        let entry = board.directory().get(&addr(7)).expect("entry");
        assert_eq!(entry.role, Role::MasterClusterHead);
        assert_eq!(entry.rpm, 0.3);
    }

    #[test]
    fn test_set_own_head_requires_tracked_candidate() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        assert!(!board.set_own_head(secs(0), &addr(1)));
        assert!(board.own_head().is_none());

        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        assert!(board.set_own_head(secs(0), &addr(1)));
        assert!(board.is_own_head(&addr(1)));

        board.clear_own_head();
        assert!(board.own_head().is_none());
    }

    #[test]
    fn test_best_head_own_head_wins_ties() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        board.update_from_hello(
            secs(0),
            0.5,
            addr(2),
            secs(5),
            &hello_head(Vec2::new(0.0, 10.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        // both candidates score 0; the own head is the accumulator seed
        assert!(board.set_own_head(secs(0), &addr(2)));
        assert_eq!(board.best_head(secs(0)), Some(addr(2)));
    }

    #[test]
    fn test_best_head_strictly_better_candidate_wins() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        board.update_from_hello(
            secs(0),
            0.5,
            addr(1),
            secs(5),
            &hello_head(Vec2::new(80.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        board.update_from_hello(
            secs(0),
            0.5,
            addr(2),
            secs(5),
            &hello_head(Vec2::new(10.0, 0.0), Vec2::ZERO),
            Vec2::ZERO,
            Vec2::ZERO,
        );
        assert!(board.set_own_head(secs(0), &addr(1)));
        assert_eq!(board.best_head(secs(0)), Some(addr(2)));
    }

    #[test]
    fn test_best_head_empty() {
        let mut board = CandidateHeadScoreboard::new(secs(1));
        assert_eq!(board.best_head(secs(0)), None);
    }
}
