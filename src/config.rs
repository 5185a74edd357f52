use serde::Deserialize;

use crate::{
    cache::Cache,
    error::ConfigError,
    hierarchy::Hierarchy,
    replace::lru::Lru,
};

/// Hierarchy parameters. Sizes are in bytes, latencies in cycles.
/// `l2_size == 0` builds an L1-only hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub l1_size: usize,
    pub l1_block_size: usize,
    pub l1_assoc: usize,
    pub l1_hit_latency: u64,
    pub l2_size: usize,
    pub l2_assoc: usize,
    pub l2_hit_latency: u64,
    pub mem_latency: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            l1_size: 16 * 1024,
            l1_block_size: 32,
            l1_assoc: 4,
            l1_hit_latency: 1,
            l2_size: 0,
            l2_assoc: 4,
            l2_hit_latency: 6,
            mem_latency: 100,
        }
    }
}

impl Config {
    /// Applies any `--l1-*`, `--l2-*` and `--mem-latency` flags on top of
    /// this config.
    pub fn override_from(&mut self, args: &mut pico_args::Arguments) -> Result<(), pico_args::Error> {
        if let Some(v) = args.opt_value_from_str("--l1-size")? {
            self.l1_size = v;
        }
        if let Some(v) = args.opt_value_from_str("--l1-block-size")? {
            self.l1_block_size = v;
        }
        if let Some(v) = args.opt_value_from_str("--l1-assoc")? {
            self.l1_assoc = v;
        }
        if let Some(v) = args.opt_value_from_str("--l1-latency")? {
            self.l1_hit_latency = v;
        }
        if let Some(v) = args.opt_value_from_str("--l2-size")? {
            self.l2_size = v;
        }
        if let Some(v) = args.opt_value_from_str("--l2-assoc")? {
            self.l2_assoc = v;
        }
        if let Some(v) = args.opt_value_from_str("--l2-latency")? {
            self.l2_hit_latency = v;
        }
        if let Some(v) = args.opt_value_from_str("--mem-latency")? {
            self.mem_latency = v;
        }
        Ok(())
    }

    pub fn to_hierarchy(&self) -> Result<Hierarchy, ConfigError> {
        let mut levels = vec![Cache::new(
            "L1".to_owned(),
            self.l1_size,
            self.l1_block_size,
            self.l1_assoc,
            self.l1_hit_latency,
            Lru::new(),
        )?];
        if self.l2_size > 0 {
            levels.push(Cache::new(
                "L2".to_owned(),
                self.l2_size,
                self.l1_block_size,
                self.l2_assoc,
                self.l2_hit_latency,
                Lru::new(),
            )?);
        }
        Hierarchy::new(levels, self.mem_latency)
    }
}
