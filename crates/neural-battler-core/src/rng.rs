use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

/// Create a deterministic RNG from a seed.
pub fn create_rng(seed: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(seed)
}

/// Derive a sub-RNG for a numbered consumer (world, environment, agent, session),
/// ensuring independent streams from one base seed.
pub fn derive_rng(base_seed: u64, stream: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(
        base_seed.wrapping_add(stream.wrapping_mul(crate::constants::RNG_DERIVATION_PRIME)),
    )
}

/// Base seed for batch session `session`, drawn from its own derived stream.
pub fn session_seed(base_seed: u64, session: usize) -> u64 {
    derive_rng(
        base_seed,
        crate::constants::SESSION_RNG_STREAM_BASE.wrapping_add(session as u64),
    )
    .random()
}
