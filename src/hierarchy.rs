//! Recursive access path through the cache levels down to memory.
//!
//! Level 0 is the cache closest to the processor. An access that falls off the
//! end of `levels` is served by memory at a fixed latency. Lower levels are
//! kept inclusive of the level above: a lower-level copy carries
//! `present_above` while the level above holds the same block, and evicting it
//! invalidates the upper copies first.

use std::str::FromStr;

use log::{debug, trace};
use serde::Serialize;

use crate::{
    cache::{Cache, CacheStats},
    error::{AccessError, ConfigError},
    replace::{lru::Lru, Replace},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}

impl AccessType {
    pub fn is_write(self) -> bool {
        self == AccessType::Write
    }
}

impl TryFrom<char> for AccessType {
    type Error = AccessError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'r' | 'R' => Ok(AccessType::Read),
            'w' | 'W' => Ok(AccessType::Write),
            _ => Err(AccessError::InvalidType(c)),
        }
    }
}

impl FromStr for AccessType {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => AccessType::try_from(c),
            (Some(c), Some(_)) => Err(AccessError::InvalidType(c)),
            (None, _) => Err(AccessError::InvalidType('\0')),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HierarchyStats {
    pub references: u64,
    pub reads: u64,
    pub writes: u64,
    pub total_latency: u64,
    pub avg_latency: f64,
    pub memory_accesses: u64,
    pub caches: Vec<CacheStats>,
}

#[derive(Debug)]
pub struct Hierarchy<R: Replace = Lru> {
    levels: Vec<Cache<R>>,
    mem_latency: u64,
    references: u64,
    reads: u64,
    writes: u64,
    total_latency: u64,
    memory_accesses: u64,
}

impl<R: Replace> Hierarchy<R> {
    /// Levels are ordered from the processor outward and must agree on block
    /// size so that one block maps to exactly one block below it.
    pub fn new(levels: Vec<Cache<R>>, mem_latency: u64) -> Result<Self, ConfigError> {
        let first = levels.first().ok_or(ConfigError::NoLevels)?;
        let block_size = first.geometry.block_size;
        if let Some(odd) = levels
            .iter()
            .find(|c| c.geometry.block_size != block_size)
        {
            return Err(ConfigError::BlockSizeMismatch {
                level: odd.name().to_owned(),
                expected: block_size,
                found: odd.geometry.block_size,
            });
        }

        Ok(Hierarchy {
            levels,
            mem_latency,
            references: 0,
            reads: 0,
            writes: 0,
            total_latency: 0,
            memory_accesses: 0,
        })
    }

    pub fn levels(&self) -> &[Cache<R>] {
        &self.levels
    }

    /// Serves one reference and returns its latency.
    ///
    /// `now` must not decrease between calls; it is the only ordering the LRU
    /// policy sees.
    pub fn access(&mut self, address: u64, kind: AccessType, now: u64) -> u64 {
        self.references += 1;
        match kind {
            AccessType::Read => self.reads += 1,
            AccessType::Write => self.writes += 1,
        }
        let latency = self.access_level(0, address, kind.is_write(), now);
        self.total_latency += latency;
        latency
    }

    /// Like [`Hierarchy::access`] but takes the access type as it appears in
    /// a trace. An unknown type leaves the hierarchy untouched.
    pub fn access_raw(&mut self, address: u64, kind: char, now: u64) -> Result<u64, AccessError> {
        let kind = AccessType::try_from(kind)?;
        Ok(self.access(address, kind, now))
    }

    /// Non-mutating lookup of `address` at one cache level.
    pub fn contains(&self, level: usize, address: u64) -> bool {
        self.levels
            .get(level)
            .is_some_and(|cache| cache.probe(&cache.split_addr(address)).is_some())
    }

    fn access_level(&mut self, level: usize, address: u64, write: bool, now: u64) -> u64 {
        let Some(cache) = self.levels.get_mut(level) else {
            self.memory_accesses += 1;
            return self.mem_latency;
        };

        let addr = cache.split_addr(address);
        if let Some(way) = cache.probe(&addr) {
            cache.touch(addr.set, way, now, write);
            cache.hit();
            trace!("{} hit {address:#x}", cache.name());
            return cache.hit_latency;
        }
        cache.miss();
        trace!("{} miss {address:#x}", cache.name());

        let hit_latency = cache.hit_latency;
        let victim = cache.select_victim(addr.set);
        let mut write_back = 0;

        if let Some(evicted) = victim.evicted {
            let victim_addr = cache.geometry.block_addr(evicted.tag, addr.set);
            if evicted.present_above {
                self.invalidate_above(level, victim_addr);
            }
            self.mark_below(level, victim_addr, false);

            if evicted.dirty {
                self.levels[level].write_back();
                debug!(
                    "{}: writing back {victim_addr:#x}",
                    self.levels[level].name()
                );
                write_back = self.access_level(level + 1, victim_addr, true, now);
            }
            self.levels[level].invalidate_way(addr.set, victim.way);
        }

        let fetch = self.access_level(level + 1, address, false, now);

        self.levels[level].install(addr.set, victim.way, addr.tag, now, write);
        self.mark_below(level, address, true);

        hit_latency + write_back + fetch
    }

    /// Removes every copy of `address` held above `level`. Only the evicting
    /// level's own dirty bit is charged a write-back; upper copies are dropped
    /// at no cost.
    fn invalidate_above(&mut self, level: usize, address: u64) {
        let Some(above) = level.checked_sub(1) else {
            return;
        };
        let cache = &mut self.levels[above];
        let addr = cache.split_addr(address);
        let Some(block) = cache.invalidate(&addr) else {
            return;
        };
        cache.back_invalidation();
        debug!("{}: back-invalidated {address:#x}", cache.name());

        if block.present_above {
            self.invalidate_above(above, address);
        }
    }

    fn mark_below(&mut self, level: usize, address: u64, present: bool) {
        if let Some(below) = self.levels.get_mut(level + 1) {
            let addr = below.split_addr(address);
            if let Some(way) = below.probe(&addr) {
                below.set_present_above(addr.set, way, present);
            }
        }
    }

    pub fn clear_stats(&mut self) {
        self.references = 0;
        self.reads = 0;
        self.writes = 0;
        self.total_latency = 0;
        self.memory_accesses = 0;
        self.levels.iter_mut().for_each(|c| c.clear_stats());
    }

    pub fn make_stats(&self) -> HierarchyStats {
        let avg_latency = if self.references == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.references as f64
        };
        HierarchyStats {
            references: self.references,
            reads: self.reads,
            writes: self.writes,
            total_latency: self.total_latency,
            avg_latency,
            memory_accesses: self.memory_accesses,
            caches: self.levels.iter().map(|c| c.make_stats()).collect(),
        }
    }
}
