//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Round-robin selector.
/// Stores an internal cursor that advances on every call.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let cursor = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(backends[cursor % backends.len()].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn backend(port: u16) -> Arc<Backend> {
        let url = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
        Arc::new(Backend::new(url, 1))
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let b1 = backend(8080);
        let b2 = backend(8081);
        let backends = vec![b1.clone(), b2.clone()];

        let s1 = lb.next_server(&backends).unwrap();
        assert_eq!(s1.url, b1.url);

        let s2 = lb.next_server(&backends).unwrap();
        assert_eq!(s2.url, b2.url);

        let s3 = lb.next_server(&backends).unwrap();
        assert_eq!(s3.url, b1.url);
    }

    #[test]
    fn test_each_server_once_per_cycle() {
        let lb = RoundRobin::new();
        let backends: Vec<_> = (0..5).map(|i| backend(9000 + i)).collect();

        let picked: Vec<Url> = (0..5)
            .map(|_| lb.next_server(&backends).unwrap().url.clone())
            .collect();
        let expected: Vec<Url> = backends.iter().map(|b| b.url.clone()).collect();
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_empty() {
        let lb = RoundRobin::new();
        assert!(lb.next_server(&[]).is_none());
    }
}
