//! Member Roster: nodes registered with this node as their cluster head.
//!
//! A plain expiring directory without scoring. The engine allocates it on
//! promotion to a head role and releases it on demotion; its only jobs are
//! answering "is my cluster empty" and feeding the membership count
//! advertised in Hello beacons.

use crate::core::message::{Hello, NodeAddress};
use crate::directory::ExpiringDirectory;
use std::time::Duration;
use tracing::debug;

pub struct MemberRoster {
    directory: ExpiringDirectory,
}

impl MemberRoster {
    pub fn new(refresh_interval: Duration) -> Self {
        MemberRoster {
            directory: ExpiringDirectory::new(refresh_interval),
        }
    }

    /// Record a member, inserting it if unknown. Returns `true` on a new
    /// admission.
    pub fn admit(&mut self, now: Duration, member: NodeAddress, ttl: Duration) -> bool {
        let inserted = self.directory.upsert(now, member, ttl, |_| {});
        if inserted {
            debug!(member = %member, "member admitted");
        }
        inserted
    }

    /// Extend the lifetime of an already-registered member from its Hello.
    /// A Hello from a non-member does not enroll it.
    pub fn refresh(&mut self, now: Duration, member: NodeAddress, ttl: Duration, hello: &Hello) {
        if !self.directory.contains(now, &member) {
            return;
        }
        self.directory.upsert(now, member, ttl, |record| {
            record.position = hello.position;
            record.velocity = hello.velocity;
            record.role = hello.role;
        });
    }

    pub fn contains(&mut self, now: Duration, member: &NodeAddress) -> bool {
        self.directory.contains(now, member)
    }

    pub fn remove(&mut self, now: Duration, member: &NodeAddress) -> bool {
        let removed = self.directory.remove(now, member);
        if removed {
            debug!(member = %member, "member removed");
        }
        removed
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
