//! Worker selection strategies.
//!
//! Selection is connection-level: the primary picks a worker index for every
//! inbound connection before any HTTP parsing happens.

use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// How the primary routes connections to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingStrategy {
    /// Cyclic index over the worker list, advanced on every connection
    /// regardless of origin.
    #[default]
    RoundRobin,
    /// Hash of the remote IP modulo worker count: the same client IP always
    /// lands on the same worker for the life of the topology. Worker
    /// replacement after a crash changes nothing for surviving slots, but a
    /// resized list reshuffles assignments; that is a known limitation of
    /// sticky routing, not a bug.
    Sticky,
    /// Uniform random worker per connection.
    Random,
}

impl RoutingStrategy {
    /// Parse a strategy name, case-insensitively.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "round-robin" | "round_robin" | "roundrobin" => Some(Self::RoundRobin),
            "sticky" => Some(Self::Sticky),
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    /// Pick a worker index for a connection.
    ///
    /// `counter` backs round-robin state and is also the fallback when a
    /// sticky selection has no peer address to hash.
    #[must_use]
    pub fn select(&self, counter: &AtomicUsize, peer: Option<IpAddr>, workers: usize) -> usize {
        debug_assert!(workers > 0);
        match self {
            RoutingStrategy::RoundRobin => counter.fetch_add(1, Ordering::Relaxed) % workers,
            RoutingStrategy::Sticky => match peer {
                Some(ip) => {
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    ip.hash(&mut hasher);
                    (hasher.finish() as usize) % workers
                }
                None => counter.fetch_add(1, Ordering::Relaxed) % workers,
            },
            RoutingStrategy::Random => rand::thread_rng().gen_range(0..workers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn from_str_accepts_known_names() {
        assert_eq!(RoutingStrategy::from_str("round-robin"), Some(RoutingStrategy::RoundRobin));
        assert_eq!(RoutingStrategy::from_str("STICKY"), Some(RoutingStrategy::Sticky));
        assert_eq!(RoutingStrategy::from_str("random"), Some(RoutingStrategy::Random));
        assert_eq!(RoutingStrategy::from_str("magic"), None);
    }

    #[test]
    fn round_robin_is_strictly_cyclic() {
        let counter = AtomicUsize::new(0);
        let picks: Vec<usize> = (0..9)
            .map(|_| RoutingStrategy::RoundRobin.select(&counter, None, 3))
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn sticky_is_stable_for_a_fixed_ip_and_list_size() {
        let counter = AtomicUsize::new(0);
        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));
        let first = RoutingStrategy::Sticky.select(&counter, Some(ip), 4);
        for _ in 0..50 {
            assert_eq!(RoutingStrategy::Sticky.select(&counter, Some(ip), 4), first);
        }
    }

    #[test]
    fn sticky_ignores_the_round_robin_counter() {
        let counter = AtomicUsize::new(0);
        let ip = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1));
        let first = RoutingStrategy::Sticky.select(&counter, Some(ip), 4);
        counter.store(17, Ordering::Relaxed);
        assert_eq!(RoutingStrategy::Sticky.select(&counter, Some(ip), 4), first);
    }

    #[test]
    fn random_stays_in_bounds() {
        let counter = AtomicUsize::new(0);
        for _ in 0..100 {
            assert!(RoutingStrategy::Random.select(&counter, None, 5) < 5);
        }
    }
}
