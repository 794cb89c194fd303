//! Load balancing across the configured upstreams.
//!
//! Selection is uniformly random and stateless: nothing about previous picks
//! is remembered, so concurrent requests never contend on shared state.

use std::cell::RefCell;

use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};

use crate::upstream::{Upstream, UpstreamSet};

thread_local! {
    // Seeded once per worker thread; selection does not need cryptographic randomness.
    static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// A random load balancer over an immutable upstream set.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    /// The upstreams to balance requests across
    servers: UpstreamSet,
}

impl LoadBalancer {
    /// Creates a new load balancer with the given upstream servers.
    ///
    /// The set is non-empty by construction, so `select` can never fail.
    pub fn new(servers: UpstreamSet) -> Self {
        Self { servers }
    }

    /// Picks one upstream uniformly at random.
    pub fn select(&self) -> &Upstream {
        select(self.servers.as_slice())
    }

    /// Returns the number of servers in the load balancer.
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn upstreams(&self) -> &UpstreamSet {
        &self.servers
    }
}

/// Picks one entry of `upstreams` uniformly at random.
///
/// # Panics
///
/// Panics if `upstreams` is empty. `UpstreamSet` rules that out, so reaching
/// the panic means a caller bypassed it.
pub fn select(upstreams: &[Upstream]) -> &Upstream {
    assert!(
        !upstreams.is_empty(),
        "Amount of servers should be greater than 0"
    );
    let index = RNG.with(|rng| rng.borrow_mut().gen_range(0..upstreams.len()));
    &upstreams[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn create_test_set(ports: &[u16]) -> UpstreamSet {
        UpstreamSet::new(ports.iter().map(|port| format!("http://127.0.0.1:{port}"))).unwrap()
    }

    #[test]
    fn test_new_load_balancer() {
        let lb = LoadBalancer::new(create_test_set(&[8001, 8002]));
        assert_eq!(lb.server_count(), 2);
    }

    #[test]
    fn test_single_upstream_is_always_selected() {
        let lb = LoadBalancer::new(create_test_set(&[8001]));
        for _ in 0..100 {
            assert_eq!(lb.select().authority.port_u16(), Some(8001));
        }
    }

    #[test]
    fn test_selection_is_member_of_set() {
        let lb = LoadBalancer::new(create_test_set(&[8001, 8002, 8003]));
        for _ in 0..500 {
            let port = lb.select().authority.port_u16().unwrap();
            assert!((8001..=8003).contains(&port));
        }
    }

    #[test]
    fn test_no_starvation_over_thousand_calls() {
        let lb = LoadBalancer::new(create_test_set(&[8001, 8002, 8003]));
        let mut counts: HashMap<u16, usize> = HashMap::new();
        for _ in 0..1000 {
            *counts
                .entry(lb.select().authority.port_u16().unwrap())
                .or_default() += 1;
        }
        assert_eq!(counts.len(), 3, "every upstream should be picked: {counts:?}");
        // Expected ~333 each; generous bounds keep this deterministic in practice.
        for count in counts.values() {
            assert!(*count > 200 && *count < 470, "skewed distribution: {counts:?}");
        }
    }

    #[test]
    #[should_panic(expected = "greater than 0")]
    fn test_select_on_empty_slice_panics() {
        select(&[]);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let lb = Arc::new(LoadBalancer::new(create_test_set(&[8001, 8002])));
        let mut handles = vec![];

        for _ in 0..10 {
            let lb_clone = Arc::clone(&lb);
            let handle = thread::spawn(move || {
                for _ in 0..100 {
                    let port = lb_clone.select().authority.port_u16().unwrap();
                    assert!(port == 8001 || port == 8002);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
