//! Weighted random load balancing strategy.

use std::sync::Arc;
use rand::Rng;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Weighted random selector.
///
/// Draws uniformly in `[0, total_weight)` and walks the backends subtracting
/// weights. Zero weights count as 1, so a pool of all-zero weights is uniform.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic part of the selection, for a given draw.
    fn pick(backends: &[Arc<Backend>], mut draw: u64) -> Option<Arc<Backend>> {
        for backend in backends {
            let weight = backend.effective_weight();
            if draw < weight {
                return Some(backend.clone());
            }
            draw -= weight;
        }
        backends.last().cloned()
    }
}

impl LoadBalancer for WeightedRandom {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let total: u64 = backends.iter().map(|b| b.effective_weight()).sum();
        let draw = rand::thread_rng().gen_range(0..total);
        Self::pick(backends, draw)
    }
}
