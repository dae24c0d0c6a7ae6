//! Per-user and per-total resource accounting and admission.
//!
//! Four countable resources — `clients`, `services`, `subscriptions`,
//! `subscription_filter_nodes` — are each tracked at two scopes. Admission of
//! a new allocation charges both scopes atomically: if either would exceed
//! its configured limit, no charge is applied and admission fails.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Clients,
    Services,
    Subscriptions,
    SubscriptionFilterNodes,
}

impl Resource {
    pub fn name(self) -> &'static str {
        match self {
            Resource::Clients => "clients",
            Resource::Services => "services",
            Resource::Subscriptions => "subscriptions",
            Resource::SubscriptionFilterNodes => "subscription_filter_nodes",
        }
    }
}

/// Optional ceiling for one resource at one scope. `None` means unlimited.
pub type Limit = Option<u64>;

/// Per-resource limits for both scopes, as configured for a domain.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub total: HashMap<Resource, Limit>,
    pub per_user: HashMap<Resource, Limit>,
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_total(mut self, resource: Resource, limit: u64) -> Self {
        self.total.insert(resource, Some(limit));
        self
    }

    pub fn with_per_user(mut self, resource: Resource, limit: u64) -> Self {
        self.per_user.insert(resource, Some(limit));
        self
    }

    fn total_limit(&self, resource: Resource) -> Limit {
        self.total.get(&resource).copied().flatten()
    }

    fn per_user_limit(&self, resource: Resource) -> Limit {
        self.per_user.get(&resource).copied().flatten()
    }
}

#[derive(Debug, Default)]
struct Counter {
    total: u64,
    per_user: HashMap<String, u64>,
}

/// Live tallies for all four resources in one domain, checked against
/// [`ResourceLimits`] on every admission.
#[derive(Debug, Default)]
pub struct ResourceAccount {
    limits: ResourceLimits,
    counters: HashMap<Resource, Counter>,
}

impl ResourceAccount {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            counters: HashMap::new(),
        }
    }

    /// Attempt to charge one unit of `resource` to `user`. On denial, no
    /// partial charge is left behind.
    pub fn charge(&mut self, resource: Resource, user: &str) -> Result<(), ()> {
        self.charge_n(resource, user, 1)
    }

    /// Attempt to charge `n` units of `resource` to `user` atomically.
    pub fn charge_n(&mut self, resource: Resource, user: &str, n: u64) -> Result<(), ()> {
        let counter = self.counters.entry(resource).or_default();
        let next_total = counter.total + n;
        if let Some(limit) = self.limits.total_limit(resource)
            && next_total > limit
        {
            return Err(());
        }
        let current_user = *counter.per_user.get(user).unwrap_or(&0);
        let next_user = current_user + n;
        if let Some(limit) = self.limits.per_user_limit(resource)
            && next_user > limit
        {
            return Err(());
        }
        counter.total = next_total;
        counter.per_user.insert(user.to_string(), next_user);
        Ok(())
    }

    /// Release one unit of `resource` previously charged to `user`.
    pub fn release(&mut self, resource: Resource, user: &str) {
        self.release_n(resource, user, 1);
    }

    pub fn release_n(&mut self, resource: Resource, user: &str, n: u64) {
        let Some(counter) = self.counters.get_mut(&resource) else {
            return;
        };
        counter.total = counter.total.saturating_sub(n);
        if let Some(entry) = counter.per_user.get_mut(user) {
            *entry = entry.saturating_sub(n);
            if *entry == 0 {
                counter.per_user.remove(user);
            }
        }
    }

    pub fn total(&self, resource: Resource) -> u64 {
        self.counters.get(&resource).map(|c| c.total).unwrap_or(0)
    }

    pub fn per_user(&self, resource: Resource, user: &str) -> u64 {
        self.counters
            .get(&resource)
            .and_then(|c| c.per_user.get(user).copied())
            .unwrap_or(0)
    }

    /// Invariant check: total equals the sum of per-user tallies.
    #[cfg(test)]
    fn invariant_holds(&self, resource: Resource) -> bool {
        let Some(counter) = self.counters.get(&resource) else {
            return true;
        };
        counter.total == counter.per_user.values().sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_and_release_round_trip() {
        let mut acc = ResourceAccount::new(ResourceLimits::unlimited());
        acc.charge(Resource::Clients, "alice").unwrap();
        acc.charge(Resource::Clients, "alice").unwrap();
        acc.charge(Resource::Clients, "bob").unwrap();
        assert_eq!(acc.total(Resource::Clients), 3);
        assert_eq!(acc.per_user(Resource::Clients, "alice"), 2);
        assert!(acc.invariant_holds(Resource::Clients));

        acc.release(Resource::Clients, "alice");
        assert_eq!(acc.total(Resource::Clients), 2);
        assert_eq!(acc.per_user(Resource::Clients, "alice"), 1);
        assert!(acc.invariant_holds(Resource::Clients));
    }

    #[test]
    fn per_user_limit_denies_without_partial_charge() {
        let limits = ResourceLimits::unlimited().with_per_user(Resource::Services, 1);
        let mut acc = ResourceAccount::new(limits);
        acc.charge(Resource::Services, "alice").unwrap();
        assert!(acc.charge(Resource::Services, "alice").is_err());
        // Denial must not have left a partial charge.
        assert_eq!(acc.per_user(Resource::Services, "alice"), 1);
        assert_eq!(acc.total(Resource::Services), 1);

        // A different user is unaffected by alice's limit.
        acc.charge(Resource::Services, "bob").unwrap();
        assert_eq!(acc.per_user(Resource::Services, "bob"), 1);
    }

    #[test]
    fn total_limit_denies_even_under_per_user_room() {
        let limits = ResourceLimits::unlimited().with_total(Resource::Clients, 1);
        let mut acc = ResourceAccount::new(limits);
        acc.charge(Resource::Clients, "alice").unwrap();
        assert!(acc.charge(Resource::Clients, "bob").is_err());
        assert_eq!(acc.total(Resource::Clients), 1);
    }
}
