//! The authoritative per-subscription record held in a
//! [`crate::domain::Domain`]'s catalogue.

use crate::filter::Filter;
use crate::service::{ClientId, ServiceId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type SubscriptionId = u64;

/// The kind of change a notification reports for a `(subscription, service)`
/// pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Appeared,
    Modified,
    Disappeared,
}

/// One registered subscription: owner, compiled filter, and the cache of
/// service-ids it currently matches (used to compute appeared/modified/
/// disappeared deltas without re-scanning notification history).
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub owner: ClientId,
    /// User identity the subscription's resource charge is accounted
    /// against, so it can be released correctly even if `owner`'s session
    /// has since been replaced by a new one reusing the same user.
    pub owner_user: String,
    pub filter_text: String,
    pub filter: Filter,
    pub matching: HashSet<ServiceId>,
}

impl Subscription {
    pub fn new(
        subscription_id: SubscriptionId,
        owner: ClientId,
        owner_user: String,
        filter_text: String,
        filter: Filter,
    ) -> Self {
        Self {
            subscription_id,
            owner,
            owner_user,
            filter_text,
            filter,
            matching: HashSet::new(),
        }
    }
}
