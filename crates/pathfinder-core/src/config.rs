//! Domain and server configuration, loaded from TOML with environment and
//! CLI overrides layered on top — mirrors the precedence order used
//! throughout the teacher workspace's own `config.rs` modules.

use crate::resources::{Resource, ResourceLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Resource ceilings as they appear in a TOML config file: `0` means
/// unlimited rather than "admit nothing", which would be a useless config.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LimitsSection {
    #[serde(default)]
    pub clients: u64,
    #[serde(default)]
    pub services: u64,
    #[serde(default)]
    pub subscriptions: u64,
    #[serde(default)]
    pub subscription_filter_nodes: u64,
}

impl LimitsSection {
    fn apply(self, mut into: ResourceLimits, scope: Scope) -> ResourceLimits {
        for (resource, value) in [
            (Resource::Clients, self.clients),
            (Resource::Services, self.services),
            (Resource::Subscriptions, self.subscriptions),
            (Resource::SubscriptionFilterNodes, self.subscription_filter_nodes),
        ] {
            if value == 0 {
                continue;
            }
            into = match scope {
                Scope::Total => into.with_total(resource, value),
                Scope::PerUser => into.with_per_user(resource, value),
            };
        }
        into
    }
}

enum Scope {
    Total,
    PerUser,
}

/// The `[domain]` section: resource ceilings and filter complexity budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub total: LimitsSection,
    #[serde(default)]
    pub per_user: LimitsSection,
    /// Maximum number of AST nodes a single subscription's filter may compile
    /// to, rejected as `insufficient-resources` past this budget.
    #[serde(default = "default_filter_node_limit")]
    pub max_filter_nodes: usize,
}

fn default_filter_node_limit() -> usize {
    256
}

impl DomainConfig {
    pub fn resource_limits(&self) -> ResourceLimits {
        let limits = self.total.apply(ResourceLimits::unlimited(), Scope::Total);
        self.per_user.apply(limits, Scope::PerUser)
    }
}

/// The `[server]` section: listen address and session timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Seconds a session may go without a `ping` (or any other transaction)
    /// before it is closed as idle.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:4242".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// The full on-disk configuration: `pathfinder.toml`'s `[server]` and
/// `[domain]` tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub domain: DomainConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overrides applied after loading, in precedence order: env vars beat
    /// the file, CLI flags beat env vars. `pathfinder-daemon` calls this with
    /// values it has already resolved from `std::env` and `clap`.
    pub fn with_bind_addr_override(mut self, bind_addr: Option<String>) -> Self {
        if let Some(addr) = bind_addr {
            self.server.bind_addr = addr;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_unlimited() {
        let cfg = DomainConfig::default();
        let limits = cfg.resource_limits();
        assert!(limits.total.is_empty());
        assert!(limits.per_user.is_empty());
    }

    #[test]
    fn nonzero_limits_round_trip_into_resource_limits() {
        let toml_text = r#"
            [total]
            clients = 100
            [per_user]
            services = 10
        "#;
        let cfg: DomainConfig = toml::from_str(toml_text).unwrap();
        let limits = cfg.resource_limits();
        assert_eq!(limits.total.get(&Resource::Clients).copied().flatten(), Some(100));
        assert_eq!(
            limits.per_user.get(&Resource::Services).copied().flatten(),
            Some(10)
        );
    }

    #[test]
    fn server_defaults_are_sane() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr, "127.0.0.1:4242");
        assert_eq!(cfg.idle_timeout_secs, 300);
    }
}
