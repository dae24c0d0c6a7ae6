//! Core types for Pathfinder, a service-discovery server.
//!
//! This crate holds everything about the domain model that does not depend
//! on a transport or an async runtime: properties and services, subscription
//! filters, the domain state machine, resource accounting, the wire message
//! types, configuration, error types and logging bootstrap. The daemon binary
//! (`pathfinder-daemon`) wires this up to real TCP sockets and a Tokio event
//! loop; the CLI binary (`pathfinder-cli`) speaks the wire protocol defined
//! here against a running daemon.

pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod logging;
pub mod protocol;
pub mod props;
pub mod resources;
pub mod service;
pub mod subscription;

pub use config::Config;
pub use domain::{Domain, HelloOutcome, Notification, ServiceSnapshot, SessionInfo, SubscriptionSnapshot};
pub use error::{DomainError, ProtocolError};
pub use filter::{Filter, FilterSyntaxError};
pub use protocol::{Command, FailReason, NotifyPayload, Request, Response, ResponseBody};
pub use props::{Props, Value};
pub use resources::{Resource, ResourceAccount, ResourceLimits};
pub use service::{ClientId, Service, ServiceId};
pub use subscription::{MatchType, Subscription, SubscriptionId};
