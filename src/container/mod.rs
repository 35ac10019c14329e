//! Dependency containers (database and cache) the services connect to.
//!
//! [`ContainerManager`] ensures each [`ContainerDescriptor`] is running with a
//! create-or-resume policy and bounded readiness polling. When the runtime is
//! unusable it reports which [`DependencyKind`]s need the `.env` fallback
//! instead of failing the run.

mod manager;
mod runtime;

pub use manager::{ContainerManager, ContainerStatus, DependencyReport};
pub use runtime::ContainerRuntime;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which backing store a container provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Database,
    Cache,
}

impl DependencyKind {
    /// `.env` key holding the connection string.
    pub fn env_key(self) -> &'static str {
        match self {
            DependencyKind::Database => crate::config::DATABASE_URL,
            DependencyKind::Cache => crate::config::REDIS_URL,
        }
    }

    /// Value the key is rewritten to when the container is unavailable.
    /// An empty cache URL disables caching.
    pub fn fallback_value(self) -> &'static str {
        match self {
            DependencyKind::Database => "sqlite:///./call_center.db",
            DependencyKind::Cache => "",
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Database => write!(f, "database"),
            DependencyKind::Cache => write!(f, "cache"),
        }
    }
}

/// How readiness of a freshly started container is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessProbe {
    /// Run inside the container; exit 0 means ready.
    Exec { command: Vec<String> },
    /// Run on the host.
    Command { command: Vec<String> },
    /// The host port accepts connections.
    Port,
}

fn default_readiness_attempts() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub readiness: ReadinessProbe,
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    pub fallback: DependencyKind,
}

impl ContainerDescriptor {
    pub fn postgres() -> Self {
        let env = [
            ("POSTGRES_DB", "call_center_db"),
            ("POSTGRES_USER", "callcenter"),
            ("POSTGRES_PASSWORD", "callcenter_pass"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            name: "callcenter_postgres_dev".to_string(),
            image: "postgres:15-alpine".to_string(),
            host_port: 5432,
            container_port: 5432,
            env,
            readiness: ReadinessProbe::Exec {
                command: ["pg_isready", "-U", "callcenter", "-d", "call_center_db"]
                    .map(String::from)
                    .to_vec(),
            },
            readiness_attempts: 30,
            fallback: DependencyKind::Database,
        }
    }

    pub fn redis() -> Self {
        Self {
            name: "callcenter_redis_dev".to_string(),
            image: "redis:7-alpine".to_string(),
            host_port: 6379,
            container_port: 6379,
            env: BTreeMap::new(),
            readiness: ReadinessProbe::Exec {
                command: vec!["redis-cli".to_string(), "ping".to_string()],
            },
            readiness_attempts: 10,
            fallback: DependencyKind::Cache,
        }
    }
}
