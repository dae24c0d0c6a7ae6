//! The authoritative per-service record held in a [`crate::domain::Domain`]'s
//! catalogue.

use crate::props::Props;
use std::time::Instant;

pub type ServiceId = u64;
pub type ClientId = u64;

/// One published service: id, monotonically-generationed property bag, TTL
/// and owner, plus the orphan-grace bookkeeping described in spec.md §4.2.
#[derive(Debug, Clone)]
pub struct Service {
    pub service_id: ServiceId,
    pub generation: u32,
    pub props: Props,
    /// TTL in seconds; also the orphan grace period.
    pub ttl: u64,
    pub owner: ClientId,
    /// User identity the resource charge for this service is accounted
    /// against. Kept independently of `owner` so the charge can be released
    /// correctly even after the owning session (and its `client_id`) is long
    /// gone, e.g. on orphan timeout.
    pub owner_user: String,
    /// Set exactly when the owning session has departed and the record has
    /// not yet timed out or been re-adopted.
    pub orphan_since: Option<Instant>,
}

impl Service {
    pub fn is_orphaned(&self) -> bool {
        self.orphan_since.is_some()
    }

    /// Deadline at which this orphan should be reaped, if it is one.
    pub fn orphan_deadline(&self) -> Option<Instant> {
        self.orphan_since
            .map(|since| since + std::time::Duration::from_secs(self.ttl))
    }
}
