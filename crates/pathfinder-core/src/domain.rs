//! The domain: one independently-administered service catalogue.
//!
//! `Domain` owns every service, subscription and live-session record for one
//! namespace and applies commands to them one at a time. Every public method
//! here is meant to run to completion without yielding — callers (in
//! `pathfinder-daemon`, a single actor task owns a `Domain` and processes one
//! command at a time over an `mpsc` channel) are what turns this into the
//! single-threaded-cooperative execution model the catalogue's invariants
//! assume.

use crate::error::DomainError;
use crate::filter::Filter;
use crate::props::Props;
use crate::resources::{Resource, ResourceAccount, ResourceLimits};
use crate::service::{ClientId, Service, ServiceId};
use crate::subscription::{MatchType, Subscription, SubscriptionId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::time::{Instant, SystemTime};

/// One notification destined for a subscriber's outbound queue. Carries
/// everything the wire `notify` message needs; `pathfinder-daemon` maps this
/// onto [`crate::protocol::NotifyPayload::ServiceChange`].
#[derive(Debug, Clone)]
pub struct Notification {
    pub subscription_id: SubscriptionId,
    pub match_type: MatchType,
    pub service_id: ServiceId,
    pub generation: Option<u32>,
    pub props: Option<Props>,
    pub ttl: Option<u64>,
    pub owner: Option<ClientId>,
    pub orphan_since: Option<Instant>,
}

impl Notification {
    fn from_service(subscription_id: SubscriptionId, match_type: MatchType, service: &Service) -> Self {
        Notification {
            subscription_id,
            match_type,
            service_id: service.service_id,
            generation: Some(service.generation),
            props: Some(service.props.clone()),
            ttl: Some(service.ttl),
            owner: Some(service.owner),
            orphan_since: service.orphan_since,
        }
    }

    fn disappeared(subscription_id: SubscriptionId, service_id: ServiceId) -> Self {
        Notification {
            subscription_id,
            match_type: MatchType::Disappeared,
            service_id,
            generation: None,
            props: None,
            ttl: None,
            owner: None,
            orphan_since: None,
        }
    }
}

/// One row of a `hello`-assigned session, tracked for `clients` snapshots and
/// for routing resource charges to the right user identity.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub client_id: ClientId,
    pub user: String,
    pub remote_addr: String,
    pub connect_time: SystemTime,
}

/// A row of a `services` snapshot.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub service_id: ServiceId,
    pub generation: u32,
    pub props: Props,
    pub ttl: u64,
    pub owner: ClientId,
    pub orphan_since: Option<Instant>,
}

/// A row of a `subscriptions` snapshot.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub owner: ClientId,
    pub filter_text: String,
}

/// The outcome of a successful `hello`.
#[derive(Debug, Clone, Copy)]
pub struct HelloOutcome {
    pub client_id: ClientId,
    pub negotiated_version: u32,
}

/// The service-discovery catalogue for one domain: services, subscriptions,
/// live sessions, resource accounting, and the orphan-expiry timer wheel.
pub struct Domain {
    services: BTreeMap<ServiceId, Service>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    sessions: BTreeMap<ClientId, SessionInfo>,
    owned_services: HashMap<ClientId, HashSet<ServiceId>>,
    owned_subscriptions: HashMap<ClientId, HashSet<SubscriptionId>>,
    orphan_heap: BinaryHeap<Reverse<(Instant, ServiceId)>>,
    resources: ResourceAccount,
    max_filter_nodes: usize,
    next_client_id: ClientId,
    min_supported_version: u32,
    max_supported_version: u32,
}

impl Domain {
    pub fn new(limits: ResourceLimits, max_filter_nodes: usize) -> Self {
        Self::with_protocol_range(
            limits,
            max_filter_nodes,
            crate::protocol::SUPPORTED_MIN_VERSION,
            crate::protocol::SUPPORTED_MAX_VERSION,
        )
    }

    pub fn with_protocol_range(
        limits: ResourceLimits,
        max_filter_nodes: usize,
        min_supported_version: u32,
        max_supported_version: u32,
    ) -> Self {
        Self {
            services: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            sessions: BTreeMap::new(),
            owned_services: HashMap::new(),
            owned_subscriptions: HashMap::new(),
            orphan_heap: BinaryHeap::new(),
            resources: ResourceAccount::new(limits),
            max_filter_nodes,
            next_client_id: 1,
            min_supported_version,
            max_supported_version,
        }
    }

    // ---- hello -----------------------------------------------------

    pub fn hello(
        &mut self,
        user: impl Into<String>,
        remote_addr: impl Into<String>,
        min_version: u32,
        max_version: u32,
        connect_time: SystemTime,
    ) -> Result<HelloOutcome, DomainError> {
        let negotiated = self.max_supported_version.min(max_version);
        let required_min = self.min_supported_version.max(min_version);
        if negotiated < required_min {
            return Err(DomainError::UnsupportedProtocolVersion {
                requested_min: min_version,
                requested_max: max_version,
            });
        }

        let user = user.into();
        self.resources
            .charge(Resource::Clients, &user)
            .map_err(|()| DomainError::ResourceExhausted("clients"))?;

        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.sessions.insert(
            client_id,
            SessionInfo {
                client_id,
                user,
                remote_addr: remote_addr.into(),
                connect_time,
            },
        );

        Ok(HelloOutcome {
            client_id,
            negotiated_version: negotiated,
        })
    }

    fn user_of(&self, client_id: ClientId) -> &str {
        self.sessions
            .get(&client_id)
            .map(|s| s.user.as_str())
            .unwrap_or("")
    }

    // ---- publish / unpublish ----------------------------------------

    pub fn publish(
        &mut self,
        caller: ClientId,
        service_id: ServiceId,
        generation: u32,
        props: Props,
        ttl: u64,
        now: Instant,
    ) -> Result<Vec<Notification>, DomainError> {
        match self.services.get(&service_id).cloned() {
            None => {
                let user = self.user_of(caller).to_string();
                self.resources
                    .charge(Resource::Services, &user)
                    .map_err(|()| DomainError::ResourceExhausted("services"))?;
                let service = Service {
                    service_id,
                    generation,
                    props,
                    ttl,
                    owner: caller,
                    owner_user: user,
                    orphan_since: None,
                };
                self.services.insert(service_id, service);
                self.owned_services
                    .entry(caller)
                    .or_default()
                    .insert(service_id);
                Ok(self.recompute_subscriptions(service_id, None))
            }
            Some(existing) if existing.is_orphaned() => {
                if generation <= existing.generation {
                    return Err(DomainError::GenerationTooOld {
                        service_id,
                        given: generation,
                        stored: existing.generation,
                    });
                }
                if let Some(set) = self.owned_services.get_mut(&existing.owner) {
                    set.remove(&service_id);
                }
                let prev = (existing.generation, existing.props.clone());
                let service = self.services.get_mut(&service_id).expect("just looked up");
                service.generation = generation;
                service.props = props;
                service.ttl = ttl;
                service.owner = caller;
                // owner_user intentionally left untouched: re-adoption charges
                // nothing, so release must still target whoever was charged
                // for Resource::Services at original publish time.
                service.orphan_since = None;
                self.owned_services
                    .entry(caller)
                    .or_default()
                    .insert(service_id);
                Ok(self.recompute_subscriptions(service_id, Some(prev)))
            }
            Some(existing) => {
                if caller != existing.owner {
                    return Err(DomainError::PermissionDenied {
                        service_id,
                        caller,
                        owner: existing.owner,
                    });
                }
                if generation > existing.generation {
                    let prev = (existing.generation, existing.props.clone());
                    let service = self.services.get_mut(&service_id).expect("just looked up");
                    service.generation = generation;
                    service.props = props;
                    service.ttl = ttl;
                    Ok(self.recompute_subscriptions(service_id, Some(prev)))
                } else if generation == existing.generation {
                    if props == existing.props {
                        // Idempotent retransmission of the same publish:
                        // accepted, no mutation, no notification.
                        Ok(Vec::new())
                    } else {
                        Err(DomainError::SameGenerationDifferentProps {
                            service_id,
                            generation,
                        })
                    }
                } else {
                    Err(DomainError::GenerationTooOld {
                        service_id,
                        given: generation,
                        stored: existing.generation,
                    })
                }
            }
        }
    }

    pub fn unpublish(
        &mut self,
        caller: ClientId,
        service_id: ServiceId,
    ) -> Result<Vec<Notification>, DomainError> {
        let Some(existing) = self.services.get(&service_id) else {
            return Err(DomainError::NonExistentService { service_id });
        };
        if existing.owner != caller {
            return Err(DomainError::PermissionDenied {
                service_id,
                caller,
                owner: existing.owner,
            });
        }

        let removed = self.services.remove(&service_id).expect("just looked up");
        if let Some(set) = self.owned_services.get_mut(&caller) {
            set.remove(&service_id);
        }
        self.resources
            .release(Resource::Services, &removed.owner_user);
        Ok(self.recompute_subscriptions(service_id, None))
    }

    /// Walks every subscription and emits appeared/modified/disappeared for
    /// `service_id` against its current state (absent iff just deleted).
    /// `prev` is the pre-update `(generation, props)` pair, used only to
    /// decide whether a still-matching service counts as modified.
    fn recompute_subscriptions(
        &mut self,
        service_id: ServiceId,
        prev: Option<(u32, Props)>,
    ) -> Vec<Notification> {
        let current = self.services.get(&service_id).cloned();
        let mut out = Vec::new();
        for sub in self.subscriptions.values_mut() {
            let matches_now = current
                .as_ref()
                .map(|s| sub.filter.matches(&s.props))
                .unwrap_or(false);
            let was_matching = sub.matching.contains(&service_id);

            if matches_now && was_matching {
                let changed = match (&prev, &current) {
                    (Some((prev_gen, prev_props)), Some(service)) => {
                        *prev_gen != service.generation || prev_props != &service.props
                    }
                    _ => false,
                };
                if changed {
                    out.push(Notification::from_service(
                        sub.subscription_id,
                        MatchType::Modified,
                        current.as_ref().unwrap(),
                    ));
                }
            } else if matches_now && !was_matching {
                sub.matching.insert(service_id);
                out.push(Notification::from_service(
                    sub.subscription_id,
                    MatchType::Appeared,
                    current.as_ref().unwrap(),
                ));
            } else if !matches_now && was_matching {
                sub.matching.remove(&service_id);
                out.push(Notification::disappeared(sub.subscription_id, service_id));
            }
        }
        out
    }

    // ---- subscribe / unsubscribe -------------------------------------

    pub fn subscribe(
        &mut self,
        caller: ClientId,
        subscription_id: SubscriptionId,
        filter_text: impl Into<String>,
    ) -> Result<Vec<Notification>, DomainError> {
        if self.subscriptions.contains_key(&subscription_id) {
            return Err(DomainError::SubscriptionAlreadyExists { subscription_id });
        }
        let filter_text = filter_text.into();
        let filter = Filter::parse(&filter_text).map_err(|e| DomainError::FilterSyntaxError(e.0))?;
        if filter.node_count() > self.max_filter_nodes {
            return Err(DomainError::FilterTooComplex {
                nodes: filter.node_count(),
                limit: self.max_filter_nodes,
            });
        }

        let user = self.user_of(caller).to_string();
        self.resources
            .charge(Resource::Subscriptions, &user)
            .map_err(|()| DomainError::ResourceExhausted("subscriptions"))?;
        if self
            .resources
            .charge_n(Resource::SubscriptionFilterNodes, &user, filter.node_count() as u64)
            .is_err()
        {
            self.resources.release(Resource::Subscriptions, &user);
            return Err(DomainError::ResourceExhausted("subscription_filter_nodes"));
        }

        let mut sub = Subscription::new(subscription_id, caller, user.clone(), filter_text, filter);
        let mut notifications = Vec::new();
        for service in self.services.values() {
            if sub.filter.matches(&service.props) {
                sub.matching.insert(service.service_id);
                notifications.push(Notification::from_service(
                    subscription_id,
                    MatchType::Appeared,
                    service,
                ));
            }
        }
        self.subscriptions.insert(subscription_id, sub);
        self.owned_subscriptions
            .entry(caller)
            .or_default()
            .insert(subscription_id);
        Ok(notifications)
    }

    pub fn unsubscribe(
        &mut self,
        caller: ClientId,
        subscription_id: SubscriptionId,
    ) -> Result<(), DomainError> {
        let Some(sub) = self.subscriptions.get(&subscription_id) else {
            return Err(DomainError::NonExistentSubscription { subscription_id });
        };
        if sub.owner != caller {
            return Err(DomainError::SubscriptionPermissionDenied {
                subscription_id,
                caller,
                owner: sub.owner,
            });
        }
        self.drop_subscription(subscription_id);
        Ok(())
    }

    fn drop_subscription(&mut self, subscription_id: SubscriptionId) {
        let Some(sub) = self.subscriptions.remove(&subscription_id) else {
            return;
        };
        let node_count = sub.filter.node_count() as u64;
        self.resources.release(Resource::Subscriptions, &sub.owner_user);
        self.resources
            .release_n(Resource::SubscriptionFilterNodes, &sub.owner_user, node_count);
        if let Some(set) = self.owned_subscriptions.get_mut(&sub.owner) {
            set.remove(&subscription_id);
        }
    }

    // ---- snapshots ----------------------------------------------------

    pub fn services(&self, filter_text: Option<&str>) -> Result<Vec<ServiceSnapshot>, DomainError> {
        let filter = filter_text
            .map(Filter::parse)
            .transpose()
            .map_err(|e| DomainError::FilterSyntaxError(e.0))?;
        Ok(self
            .services
            .values()
            .filter(|s| filter.as_ref().map(|f| f.matches(&s.props)).unwrap_or(true))
            .map(|s| ServiceSnapshot {
                service_id: s.service_id,
                generation: s.generation,
                props: s.props.clone(),
                ttl: s.ttl,
                owner: s.owner,
                orphan_since: s.orphan_since,
            })
            .collect())
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionSnapshot> {
        self.subscriptions
            .values()
            .map(|s| SubscriptionSnapshot {
                subscription_id: s.subscription_id,
                owner: s.owner,
                filter_text: s.filter_text.clone(),
            })
            .collect()
    }

    /// The client a live subscription belongs to, for routing a
    /// [`Notification`] to the right session's outbound queue.
    pub fn subscription_owner(&self, subscription_id: SubscriptionId) -> Option<ClientId> {
        self.subscriptions.get(&subscription_id).map(|s| s.owner)
    }

    pub fn clients(&self) -> Vec<SessionInfo> {
        self.sessions.values().cloned().collect()
    }

    // ---- session close / orphan bookkeeping ---------------------------

    /// Called once a session's transport is gone, for any reason. Drops its
    /// subscriptions immediately and orphans its services; emits no
    /// notifications (orphaning is silent per spec).
    pub fn on_session_close(&mut self, client_id: ClientId, now: Instant) {
        if let Some(sub_ids) = self.owned_subscriptions.remove(&client_id) {
            for subscription_id in sub_ids {
                if let Some(sub) = self.subscriptions.remove(&subscription_id) {
                    let node_count = sub.filter.node_count() as u64;
                    self.resources.release(Resource::Subscriptions, &sub.owner_user);
                    self.resources.release_n(
                        Resource::SubscriptionFilterNodes,
                        &sub.owner_user,
                        node_count,
                    );
                }
            }
        }
        if let Some(service_ids) = self.owned_services.get(&client_id).cloned() {
            for service_id in service_ids {
                if let Some(service) = self.services.get_mut(&service_id) {
                    service.orphan_since = Some(now);
                    self.orphan_heap.push(Reverse((now + std::time::Duration::from_secs(service.ttl), service_id)));
                }
            }
        }
        if let Some(session) = self.sessions.remove(&client_id) {
            self.resources.release(Resource::Clients, &session.user);
        }
    }

    /// Deadline of the next orphan that would expire, if any. The daemon's
    /// actor task sleeps until this instant (or forever if `None`).
    pub fn next_orphan_deadline(&self) -> Option<Instant> {
        self.orphan_heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pops and reaps every orphan whose deadline has passed. Returns the
    /// disappeared notifications generated.
    pub fn expire_orphans(&mut self, now: Instant) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Some(Reverse((deadline, service_id))) = self.orphan_heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.orphan_heap.pop();

            let Some(service) = self.services.get(&service_id) else {
                continue;
            };
            // Stale entry: the service was re-adopted or unpublished since
            // this timer was armed.
            if service.orphan_deadline() != Some(deadline) {
                continue;
            }

            let removed = self.services.remove(&service_id).expect("just looked up");
            if let Some(set) = self.owned_services.get_mut(&removed.owner) {
                set.remove(&service_id);
            }
            self.resources.release(Resource::Services, &removed.owner_user);
            out.extend(self.recompute_subscriptions(service_id, None));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain::new(ResourceLimits::unlimited(), 256)
    }

    fn props_with(pairs: &[(&str, crate::props::Value)]) -> Props {
        let mut p = Props::new();
        for (k, v) in pairs {
            p.insert(*k, v.clone());
        }
        p
    }

    fn hello(d: &mut Domain, user: &str) -> ClientId {
        d.hello(user, format!("{user}:addr"), 1, 1, SystemTime::UNIX_EPOCH)
            .unwrap()
            .client_id
    }

    #[test]
    fn basic_discovery() {
        let mut d = domain();
        let a = hello(&mut d, "alice");
        let b = hello(&mut d, "bob");

        let props = props_with(&[("name", "foo".into())]);
        let notifs = d.publish(a, 0x4711, 0, props, 60, Instant::now()).unwrap();
        assert!(notifs.is_empty(), "no subscribers yet");

        let notifs = d.subscribe(b, 1, "(name=foo)").unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].match_type, MatchType::Appeared);
        assert_eq!(notifs[0].service_id, 0x4711);
    }

    #[test]
    fn republish_with_equal_or_lower_generation_is_rejected() {
        let mut d = domain();
        let a = hello(&mut d, "alice");
        let b = hello(&mut d, "bob");
        d.subscribe(b, 1, "(color=*)").unwrap();

        d.publish(a, 0x4711, 0, props_with(&[("color", "green".into())]), 60, Instant::now())
            .unwrap();
        let err = d
            .publish(a, 0x4711, 0, props_with(&[("color", "blue".into())]), 60, Instant::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::SameGenerationDifferentProps { .. }));

        let snapshot = d.services(None).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot[0].props.get("color").next(),
            Some(&crate::props::Value::from("green"))
        );
    }

    #[test]
    fn orphan_reappoption_yields_modified_not_disappeared_then_appeared() {
        let mut d = domain();
        let a1 = hello(&mut d, "alice");
        let c = hello(&mut d, "carol");
        let t0 = Instant::now();

        let notifs = d.subscribe(c, 1, "(name=svc)").unwrap();
        assert!(notifs.is_empty());

        let notifs = d
            .publish(a1, 0x10, 0, props_with(&[("name", "svc".into())]), 5, t0)
            .unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].match_type, MatchType::Appeared);

        let t1 = t0 + std::time::Duration::from_secs(1);
        d.on_session_close(a1, t1);
        assert!(d.next_orphan_deadline().is_some());

        let t3 = t0 + std::time::Duration::from_secs(3);
        let a2 = hello(&mut d, "alice");
        let notifs = d
            .publish(a2, 0x10, 1, props_with(&[("name", "svc".into())]), 5, t3)
            .unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].match_type, MatchType::Modified);

        // Expiring at t3 (or any time before the new deadline) must not reap
        // the re-adopted service.
        let expired = d.expire_orphans(t3);
        assert!(expired.is_empty());
    }

    #[test]
    fn orphan_timeout_without_readoption_yields_disappeared() {
        let mut d = domain();
        let a = hello(&mut d, "alice");
        let c = hello(&mut d, "carol");
        let t0 = Instant::now();

        d.subscribe(c, 1, "(name=svc)").unwrap();
        d.publish(a, 0x10, 0, props_with(&[("name", "svc".into())]), 5, t0)
            .unwrap();

        let t1 = t0 + std::time::Duration::from_secs(1);
        d.on_session_close(a, t1);

        let t_before = t0 + std::time::Duration::from_secs(5);
        assert!(d.expire_orphans(t_before).is_empty(), "ttl counts from orphan_since, not publish");

        let t6 = t0 + std::time::Duration::from_secs(6);
        let notifs = d.expire_orphans(t6);
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].match_type, MatchType::Disappeared);
        assert!(d.services(None).unwrap().is_empty());
    }

    #[test]
    fn filter_syntax_error_on_subscribe() {
        let mut d = domain();
        let a = hello(&mut d, "alice");
        let err = d.subscribe(a, 9, "(&(name=x)").unwrap_err();
        assert!(matches!(err, DomainError::FilterSyntaxError(_)));
    }

    #[test]
    fn per_user_resource_limit_denies_second_service() {
        let limits = ResourceLimits::unlimited().with_per_user(Resource::Services, 1);
        let mut d = Domain::new(limits, 256);
        let a = hello(&mut d, "alice");

        d.publish(a, 1, 0, Props::new(), 60, Instant::now()).unwrap();
        let err = d.publish(a, 2, 0, Props::new(), 60, Instant::now()).unwrap_err();
        assert!(matches!(err, DomainError::ResourceExhausted(_)));
        assert_eq!(d.services(None).unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_releases_filter_node_charge() {
        let limits = ResourceLimits::unlimited().with_per_user(Resource::SubscriptionFilterNodes, 1);
        let mut d = Domain::new(limits, 256);
        let a = hello(&mut d, "alice");

        d.subscribe(a, 1, "(name=foo)").unwrap();
        assert!(d.subscribe(a, 2, "(name=bar)").is_err());

        d.unsubscribe(a, 1).unwrap();
        d.subscribe(a, 2, "(name=bar)").unwrap();
    }

    #[test]
    fn unpublish_by_non_owner_is_permission_denied() {
        let mut d = domain();
        let a = hello(&mut d, "alice");
        let b = hello(&mut d, "bob");
        d.publish(a, 1, 0, Props::new(), 60, Instant::now()).unwrap();
        let err = d.unpublish(b, 1).unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied { .. }));
    }

    #[test]
    fn hello_rejects_disjoint_protocol_range() {
        let mut d = domain();
        let err = d
            .hello("alice", "addr", 2, 5, SystemTime::UNIX_EPOCH)
            .unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedProtocolVersion { .. }));
    }
}
