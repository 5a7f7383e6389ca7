//! Uniform random load balancing strategy.

use rand::seq::SliceRandom;

use crate::load_balancer::LoadBalancer;

/// Picks one healthy backend uniformly at random.
/// Stateless, so two connections from the same client may land anywhere.
#[derive(Debug, Default)]
pub struct RandomSelection;

impl RandomSelection {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomSelection {
    fn next_backend(&self, healthy: &[usize]) -> Option<usize> {
        healthy.choose(&mut rand::thread_rng()).copied()
    }
}
