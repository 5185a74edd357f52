use std::ops::Range;

use serde::Serialize;

use crate::{
    addr::{Addr, Geometry},
    error::ConfigError,
    replace::{Replace, Victim},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub miss_rate: f64,
    pub write_backs: u64,
    pub back_invalidations: u64,
    pub resident: usize,
}

#[derive(Debug)]
pub struct Cache<R: Replace> {
    name: String,
    blocks: Vec<Block>,
    pub geometry: Geometry,
    pub hit_latency: u64,
    pub repl: R,
    hits: u64,
    misses: u64,
    write_backs: u64,
    back_invalidations: u64,
}

impl<R: Replace> Cache<R> {
    pub fn new(
        name: String,
        capacity: usize,
        block_size: usize,
        n_ways: usize,
        hit_latency: u64,
        repl: R,
    ) -> Result<Self, ConfigError> {
        let geometry = Geometry::new(&name, capacity, block_size, n_ways)?;
        let n_blocks = geometry.n_sets * geometry.n_ways;
        let mut blocks = Vec::new();
        if blocks.try_reserve_exact(n_blocks).is_err() {
            return Err(ConfigError::TooLarge { level: name });
        }
        blocks.resize(n_blocks, Block::default());

        Ok(Cache {
            name,
            blocks,
            geometry,
            hit_latency,
            repl,
            hits: 0,
            misses: 0,
            write_backs: 0,
            back_invalidations: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn split_addr(&self, address: u64) -> Addr {
        self.geometry.split_addr(address)
    }

    fn get_set(&self, set: usize) -> Range<usize> {
        set * self.geometry.n_ways..(set + 1) * self.geometry.n_ways
    }

    pub fn set(&self, set: usize) -> &[Block] {
        &self.blocks[self.get_set(set)]
    }

    pub fn block(&self, set: usize, way: usize) -> &Block {
        &self.blocks[set * self.geometry.n_ways + way]
    }

    fn block_mut(&mut self, set: usize, way: usize) -> &mut Block {
        &mut self.blocks[set * self.geometry.n_ways + way]
    }

    /// Way holding a valid copy of `addr`, if any.
    pub fn probe(&self, addr: &Addr) -> Option<usize> {
        self.set(addr.set)
            .iter()
            .position(|b| b.valid && b.tag == addr.tag)
    }

    pub fn select_victim(&self, set: usize) -> Victim {
        let way = self.repl.victim(self.set(set));
        let block = self.block(set, way);
        Victim {
            way,
            evicted: block.valid.then_some(*block),
        }
    }

    pub fn install(&mut self, set: usize, way: usize, tag: u64, now: u64, dirty: bool) {
        let block = self.block_mut(set, way);
        *block = Block {
            tag,
            valid: true,
            dirty,
            last_access: now,
            present_above: false,
        };
    }

    pub fn touch(&mut self, set: usize, way: usize, now: u64, write: bool) {
        let block = self.block_mut(set, way);
        block.last_access = now;
        block.dirty |= write;
    }

    pub fn set_present_above(&mut self, set: usize, way: usize, present: bool) {
        self.block_mut(set, way).present_above = present;
    }

    pub fn invalidate_way(&mut self, set: usize, way: usize) {
        self.block_mut(set, way).valid = false;
    }

    /// Drops the copy of `addr`, returning what it held.
    pub fn invalidate(&mut self, addr: &Addr) -> Option<Block> {
        let way = self.probe(addr)?;
        let block = *self.block(addr.set, way);
        self.invalidate_way(addr.set, way);
        Some(block)
    }

    pub fn valid_blocks(&self) -> impl Iterator<Item = (usize, &Block)> + '_ {
        let n_ways = self.geometry.n_ways;
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.valid)
            .map(move |(i, b)| (i / n_ways, b))
    }

    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn write_back(&mut self) {
        self.write_backs += 1;
    }

    pub fn back_invalidation(&mut self) {
        self.back_invalidations += 1;
    }

    pub fn clear_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.write_backs = 0;
        self.back_invalidations = 0;
    }

    pub fn make_stats(&self) -> CacheStats {
        let total_access = self.hits + self.misses;
        let miss_rate = if total_access == 0 {
            0.0
        } else {
            self.misses as f64 / total_access as f64
        };

        CacheStats {
            name: self.name.clone(),
            hits: self.hits,
            misses: self.misses,
            miss_rate,
            write_backs: self.write_backs,
            back_invalidations: self.back_invalidations,
            resident: self.valid_blocks().count(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub tag: u64,
    pub valid: bool,
    pub dirty: bool,
    pub last_access: u64,
    /// Set on a lower level's copy while the level above also holds it.
    pub present_above: bool,
}
