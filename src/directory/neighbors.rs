//! Neighbor Scoreboard: one-hop neighbors scored by Relative Position and
//! Mobility (RPM).
//!
//! Lower RPM means the neighbor sits closer to the centroid of its
//! neighborhood and moves at a more typical speed, which is what makes it a
//! good election nominee.

use crate::core::message::{Hello, NodeAddress, Role, UndecidedAdv};
use crate::directory::{ExpiringDirectory, ScoreDirection};
use crate::utils::geometry::{median, Vec2};
use std::time::Duration;
use tracing::trace;

pub struct NeighborScoreboard {
    directory: ExpiringDirectory,
}

impl NeighborScoreboard {
    pub fn new(refresh_interval: Duration) -> Self {
        NeighborScoreboard {
            directory: ExpiringDirectory::new(refresh_interval),
        }
    }

    /// Refresh from a Hello beacon; position, velocity, scores, and the
    /// announced role are copied verbatim.
    pub fn update_from_hello(
        &mut self,
        now: Duration,
        source: NodeAddress,
        ttl: Duration,
        hello: &Hello,
    ) {
        self.directory.upsert(now, source, ttl, |record| {
            record.position = hello.position;
            record.velocity = hello.velocity;
            record.rpm = hello.rpm;
            record.rsm = hello.rsm;
            record.role = hello.role;
        });
    }

    /// Refresh from an UndecidedAdv; the sender's role is Undecided by
    /// definition of the message.
    pub fn update_from_unadv(
        &mut self,
        now: Duration,
        source: NodeAddress,
        ttl: Duration,
        adv: &UndecidedAdv,
    ) {
        self.directory.upsert(now, source, ttl, |record| {
            record.position = adv.position;
            record.velocity = adv.velocity;
            record.rpm = adv.rpm;
            record.role = Role::Undecided;
        });
    }

    /// Relative Position and Mobility of this node within its neighborhood.
    ///
    /// `alpha` weighs the centroid-distance term against the
    /// speed-deviation term. An isolated node scores 1.0, the worst value.
    /// A zero denominator (all positions or all speeds identical) makes the
    /// corresponding term contribute 0.
    pub fn relative_position_and_mobility(
        &self,
        alpha: f64,
        self_position: Vec2,
        self_velocity: Vec2,
    ) -> f64 {
        let records = self.directory.records();
        if records.is_empty() {
            return 1.0;
        }

        // centroid over self and every neighbor
        let mut centroid = self_position;
        for record in records {
            centroid = centroid + record.position;
        }
        let centroid = centroid / (records.len() + 1) as f64;

        let mut speeds = Vec::with_capacity(records.len() + 1);
        speeds.push(self_velocity.magnitude());
        speeds.extend(records.iter().map(|r| r.velocity.magnitude()));
        let median_speed = median(&speeds);

        let d_self = centroid.distance_to(self_position);
        let s_self = (median_speed - self_velocity.magnitude()).abs();

        let mut d_max = d_self;
        let mut s_max = s_self;
        for record in records {
            d_max = d_max.max(centroid.distance_to(record.position));
            s_max = s_max.max((median_speed - record.velocity.magnitude()).abs());
        }

        let position_term = if d_max > 0.0 { d_self / d_max } else { 0.0 };
        let speed_term = if s_max > 0.0 { s_self / s_max } else { 0.0 };

        let rpm = alpha * position_term + (1.0 - alpha) * speed_term;
        trace!(rpm, d_self, d_max, s_self, s_max, median_speed, "rpm computed");
        rpm
    }

    /// Neighbor with the lowest RPM, the deterministic election nominee.
    pub fn lowest_rpm(&mut self, now: Duration) -> Option<NodeAddress> {
        self.directory.best_by_score(now, ScoreDirection::Min, |r| r.rpm)
    }

    /// Neighbor with the highest RPM.
    pub fn highest_rpm(&mut self, now: Duration) -> Option<NodeAddress> {
        self.directory.best_by_score(now, ScoreDirection::Max, |r| r.rpm)
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
