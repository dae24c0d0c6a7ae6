//! Pathfinder daemon: wires a [`pathfinder_core::Domain`] to real TCP sockets
//! and a Tokio runtime.
//!
//! The domain's invariants assume single-threaded-cooperative execution (see
//! spec.md §5): a command runs to completion without another command
//! observing a half-applied mutation. On a real multi-task Tokio runtime this
//! is realized with an **actor**: one task ([`domain_actor`]) owns the
//! `Domain` and drains an `mpsc` channel of [`domain_actor::DomainCommand`]s
//! one at a time, replying over a `oneshot` channel per command. Every
//! connection gets its own lightweight session task ([`session`]) that only
//! does framing and protocol bookkeeping; it holds no catalogue state itself.

pub mod domain_actor;
pub mod framing;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod time;

pub use domain_actor::{spawn_domain_actor, DomainCommand, DomainHandle};
pub use server::{run_server, serve};
