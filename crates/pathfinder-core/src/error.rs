//! Error taxonomies for the domain and session layers.
//!
//! Per spec, errors fall into four taxonomies: protocol violations close the
//! session; transaction failures reply `fail` and leave the session open;
//! resource exhaustion replies `fail:insufficient-resources` (or refuses a
//! new connection); transport failures close the session and orphan its
//! services. [`DomainError`] covers the middle two taxonomies (every
//! domain-command rejection carries a wire [`crate::protocol::FailReason`]);
//! [`ProtocolError`] covers the first.

use crate::protocol::FailReason;
use thiserror::Error;

/// A domain-command rejection. Every variant maps to exactly one wire
/// [`FailReason`] via [`DomainError::fail_reason`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// `publish` with a generation less-than-or-equal to the stored one,
    /// where props also differ from what is stored (equal generation,
    /// different props is rejected rather than silently ignored — see
    /// spec.md §9 Open Question, resolved in DESIGN.md).
    #[error("service {service_id} generation {given} is not newer than stored generation {stored}")]
    GenerationTooOld {
        service_id: u64,
        given: u32,
        stored: u32,
    },

    /// `publish` with generation equal to stored, and props differ.
    #[error("service {service_id} republished at same generation {generation} with different props")]
    SameGenerationDifferentProps { service_id: u64, generation: u32 },

    /// `publish`/`unpublish` targeting a service owned by a different live
    /// client than the caller.
    #[error("client {caller} may not operate on service {service_id} owned by client {owner}")]
    PermissionDenied {
        service_id: u64,
        caller: u64,
        owner: u64,
    },

    /// `unpublish`/`services`-by-id targeting an id not in the catalogue.
    #[error("service {service_id} does not exist")]
    NonExistentService { service_id: u64 },

    /// `unsubscribe` targeting an id not owned by any live subscription.
    #[error("subscription {subscription_id} does not exist")]
    NonExistentSubscription { subscription_id: u64 },

    /// `unsubscribe` targeting a subscription owned by a different client.
    #[error("client {caller} may not operate on subscription {subscription_id} owned by client {owner}")]
    SubscriptionPermissionDenied {
        subscription_id: u64,
        caller: u64,
        owner: u64,
    },

    /// `subscribe` with an id already registered by any client.
    #[error("subscription {subscription_id} already exists")]
    SubscriptionAlreadyExists { subscription_id: u64 },

    /// Filter text failed to parse.
    #[error("filter syntax error: {0}")]
    FilterSyntaxError(String),

    /// Compiled filter node count exceeds the per-subscription complexity
    /// limit.
    #[error("filter has {nodes} nodes, exceeding the limit of {limit}")]
    FilterTooComplex { nodes: usize, limit: usize },

    /// A resource charge (clients/services/subscriptions/filter nodes)
    /// could not be admitted under the per-user or total limit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// `hello` requested a protocol version range with no overlap with the
    /// versions this server supports.
    #[error("unsupported protocol version range {requested_min}..={requested_max}")]
    UnsupportedProtocolVersion {
        requested_min: u32,
        requested_max: u32,
    },

    /// Any command other than `hello` arrived before a successful `hello`.
    #[error("no hello received yet")]
    NoHello,

    /// `hello` arrived on a session that already completed one, or assigned
    /// a `client_id` that collides with a live session.
    #[error("client id {0} already in use")]
    ClientIdExists(u64),
}

impl DomainError {
    /// The wire [`FailReason`] this error is reported as.
    pub fn fail_reason(&self) -> FailReason {
        match self {
            DomainError::GenerationTooOld { .. } => FailReason::OldGeneration,
            DomainError::SameGenerationDifferentProps { .. } => {
                FailReason::SameGenerationButDifferent
            }
            DomainError::PermissionDenied { .. } => FailReason::PermissionDenied,
            DomainError::NonExistentService { .. } => FailReason::NonExistentService,
            DomainError::NonExistentSubscription { .. } => FailReason::NonExistentSubscription,
            DomainError::SubscriptionPermissionDenied { .. } => FailReason::PermissionDenied,
            DomainError::SubscriptionAlreadyExists { .. } => FailReason::SubscriptionIdExists,
            DomainError::FilterSyntaxError(_) => FailReason::InvalidFilterSyntax,
            // The wire protocol has no dedicated "too complex" code; an
            // over-budget filter is reported the same way as any other
            // admission denial.
            DomainError::FilterTooComplex { .. } => FailReason::InsufficientResources,
            DomainError::ResourceExhausted(_) => FailReason::InsufficientResources,
            DomainError::UnsupportedProtocolVersion { .. } => {
                FailReason::UnsupportedProtocolVersion
            }
            DomainError::NoHello => FailReason::NoHello,
            DomainError::ClientIdExists(_) => FailReason::ClientIdExists,
        }
    }
}

/// A session-layer protocol violation. Any occurrence closes the session;
/// no transaction reply beyond a best-effort in-flight `fail` is sent.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("message arrived before hello")]
    BeforeHello,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("transport closed")]
    TransportClosed,

    #[error("idle timeout waiting for ping")]
    IdleTimeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
