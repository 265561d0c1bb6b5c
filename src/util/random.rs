use rand::Rng;

/// Seam for the engine's random peer selection so tests can pin choices.
pub trait NodeRandom: Send + Sync {
    /// a uniformly random index in `0..bound`; `bound` must be > 0
    fn gen_index(&self, bound: usize) -> usize;
}

pub struct ThreadRngRandom;

impl NodeRandom for ThreadRngRandom {
    fn gen_index(&self, bound: usize) -> usize {
        rand::thread_rng().gen_range(0..bound)
    }
}
