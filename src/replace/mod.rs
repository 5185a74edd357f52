pub mod lru;

use crate::cache::Block;

/// Picks the way to fill on a miss.
pub trait Replace {
    /// `set` is never empty. An invalid way must be preferred over any valid
    /// one so that a cold set never evicts.
    fn victim(&self, set: &[Block]) -> usize;
}

/// Outcome of victim selection: the way to fill and, if that way held a
/// valid block, a copy of what is being evicted.
#[derive(Debug, Clone, Copy)]
pub struct Victim {
    pub way: usize,
    pub evicted: Option<Block>,
}
