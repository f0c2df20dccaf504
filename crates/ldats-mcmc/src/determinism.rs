use ldats_core::derive_substream_seed;

/// Derives the deterministic seed used to initialise a chain.
pub fn chain_seed(master_seed: u64, handle: usize) -> u64 {
    derive_substream_seed(master_seed, handle as u64)
}

/// Derives the deterministic seed for one move executed by a chain during an iteration.
///
/// Seeds are keyed by the chain's state handle rather than its ladder rank, so
/// serial and parallel schedules consume identical streams.
pub fn move_seed(master_seed: u64, handle: usize, iteration: usize, move_slot: usize) -> u64 {
    let intermediate =
        derive_substream_seed(master_seed, (handle as u64) << 40 | iteration as u64);
    derive_substream_seed(intermediate, move_slot as u64)
}

/// Deterministic seed for the swap attempt between ranks `pair` and `pair + 1`.
pub fn swap_seed(master_seed: u64, iteration: usize, pair_index: usize) -> u64 {
    derive_substream_seed(
        master_seed ^ 0xA5A5_A5A5_A5A5_A5A5,
        (iteration as u64) << 16 | pair_index as u64,
    )
}
