use crate::cache::Block;

use super::Replace;

/// Timestamp LRU. Ties on `last_access` go to the lowest way so replays are
/// reproducible.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lru;

impl Lru {
    pub fn new() -> Self {
        Lru
    }
}

impl Replace for Lru {
    fn victim(&self, set: &[Block]) -> usize {
        if let Some(vacant) = set.iter().position(|b| !b.valid) {
            // Empty block, no eviction
            return vacant;
        }
        set.iter()
            .enumerate()
            .min_by_key(|(way, b)| (b.last_access, *way))
            .map(|(way, _)| way)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: u64, last_access: u64) -> Block {
        Block {
            valid: true,
            tag,
            last_access,
            ..Block::default()
        }
    }

    #[test]
    fn prefers_invalid_way() {
        let set = [block(1, 0), Block::default(), Block::default()];
        assert_eq!(Lru::new().victim(&set), 1);
    }

    #[test]
    fn picks_oldest_timestamp() {
        let set = [block(1, 9), block(2, 3), block(3, 5)];
        assert_eq!(Lru::new().victim(&set), 1);
    }

    #[test]
    fn ties_go_to_lowest_way() {
        let set = [block(1, 8), block(2, 4), block(3, 4), block(4, 4)];
        assert_eq!(Lru::new().victim(&set), 1);
    }

    #[test]
    fn dirty_blocks_are_not_spared() {
        let mut old = block(1, 1);
        old.dirty = true;
        let set = [block(2, 2), old];
        assert_eq!(Lru::new().victim(&set), 1);
    }
}
