//! # Cluster Module
//!
//! Connection-level load balancing across a pool of long-lived workers.
//!
//! ## Overview
//!
//! A primary accept loop owns the listening socket and hands each raw TCP
//! connection to one of N workers chosen by a [`RoutingStrategy`]. Workers do
//! their own HTTP parsing via the embedder-supplied connection handler; the
//! primary never inspects bytes, so TLS passes through and is terminated (or
//! not) inside the worker.
//!
//! Workers here are threads fed over channels rather than forked processes;
//! the strategy arithmetic, supervision, and shutdown semantics are the same
//! either way.
//!
//! ## Supervision
//!
//! A worker that dies (handler panic) is logged and respawned at the same
//! index, with exponential backoff between respawns. Exceeding the configured
//! restarts-per-window budget trips a circuit breaker and shuts the cluster
//! down with [`ClusterError::CrashLoop`] rather than respawning forever.
//!
//! ## Shutdown
//!
//! On `SIGINT` (or [`ClusterHandle::shutdown`]) the primary broadcasts a
//! shutdown message to every worker, waits a fixed grace period for them to
//! drain, then gives up waiting and returns. Workers finish their in-flight
//! connection before exiting.
//!
//! ## Environment Variables
//!
//! - `TURNPIKE_WORKERS` - worker count (default: all available cores; must
//!   not exceed them)
//! - `TURNPIKE_STRATEGY` - `round-robin` (default), `sticky`, or `random`
//! - `TURNPIKE_SHUTDOWN_GRACE_MS` - grace period before giving up on workers
//!   (default 5000)
//! - `TURNPIKE_MEMORY_LIMIT_MB` - per-worker memory warning threshold
//!   (default 100)

mod memory;
mod strategy;
mod supervisor;

pub use memory::MemoryMonitor;
pub use strategy::RoutingStrategy;
pub use supervisor::{Cluster, ClusterHandle, ConnHandler, WorkerContext};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Certificate material passed through to workers; the primary never
/// terminates TLS itself.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: Option<PathBuf>,
}

/// Cluster-level failures.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{requested} workers requested but only {available} cores available")]
    TooManyWorkers { requested: usize, available: usize },
    #[error("cluster requires at least one worker")]
    NoWorkers,
    #[error("cluster listener error: {0}")]
    Listener(#[from] std::io::Error),
    #[error("worker {index} crash-looping: {restarts} restarts within {window_secs}s")]
    CrashLoop {
        index: usize,
        restarts: usize,
        window_secs: u64,
    },
}

/// Cluster topology and supervision settings.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub host: String,
    pub port: u16,
    /// Worker count; must not exceed available CPU cores.
    pub workers: usize,
    pub strategy: RoutingStrategy,
    pub tls: Option<TlsConfig>,
    /// How long shutdown waits for workers to drain (default 5 s).
    pub shutdown_grace: Duration,
    /// Per-worker memory warning threshold (default 100 MB).
    pub memory_limit_bytes: u64,
    /// Memory sampling interval (default 10 s).
    pub memory_check_interval: Duration,
    /// Restarts-per-window budget before the circuit breaker trips.
    pub max_restarts: usize,
    pub restart_window: Duration,
}

impl ClusterConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let workers = std::env::var("TURNPIKE_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.workers);
        let strategy = std::env::var("TURNPIKE_STRATEGY")
            .ok()
            .and_then(|s| RoutingStrategy::from_str(&s))
            .unwrap_or_default();
        let shutdown_grace = std::env::var("TURNPIKE_SHUTDOWN_GRACE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.shutdown_grace);
        let memory_limit_bytes = std::env::var("TURNPIKE_MEMORY_LIMIT_MB")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|mb| mb * 1024 * 1024)
            .unwrap_or(defaults.memory_limit_bytes);
        Self {
            workers,
            strategy,
            shutdown_grace,
            memory_limit_bytes,
            ..defaults
        }
    }

    pub(crate) fn available_cores() -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }

    /// Fail fast on impossible topologies.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.workers == 0 {
            return Err(ClusterError::NoWorkers);
        }
        let available = Self::available_cores();
        if self.workers > available {
            return Err(ClusterError::TooManyWorkers {
                requested: self.workers,
                available,
            });
        }
        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: Self::available_cores(),
            strategy: RoutingStrategy::default(),
            tls: None,
            shutdown_grace: Duration::from_secs(5),
            memory_limit_bytes: 100 * 1024 * 1024,
            memory_check_interval: Duration::from_secs(10),
            max_restarts: 5,
            restart_window: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_workers_fails_fast() {
        let config = ClusterConfig {
            workers: ClusterConfig::available_cores() + 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ClusterError::TooManyWorkers { .. })
        ));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let config = ClusterConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClusterError::NoWorkers)));
    }

    #[test]
    fn single_worker_validates() {
        let config = ClusterConfig {
            workers: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
