use crate::error::ConfigError;

/// A byte address split for one particular cache geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub offset: u64,
    pub set: usize,
    pub tag: u64,
}

/// Shape of a set-associative array. Sets and block size need not be powers
/// of two, so addresses are split arithmetically rather than by masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub n_sets: usize,
    pub n_ways: usize,
    pub block_size: usize,
}

impl Geometry {
    pub fn new(
        level: &str,
        capacity: usize,
        block_size: usize,
        n_ways: usize,
    ) -> Result<Self, ConfigError> {
        for (field, value) in [
            ("capacity", capacity),
            ("block_size", block_size),
            ("assoc", n_ways),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension {
                    level: level.to_owned(),
                    field,
                });
            }
        }

        let set_bytes = block_size
            .checked_mul(n_ways)
            .ok_or_else(|| ConfigError::TooLarge {
                level: level.to_owned(),
            })?;
        if capacity % set_bytes != 0 {
            return Err(ConfigError::NotDivisible {
                level: level.to_owned(),
                capacity,
                set_bytes,
            });
        }

        Ok(Geometry {
            n_sets: capacity / set_bytes,
            n_ways,
            block_size,
        })
    }

    pub fn capacity(&self) -> usize {
        self.n_sets * self.n_ways * self.block_size
    }

    pub fn split_addr(&self, address: u64) -> Addr {
        let block_size = self.block_size as u64;
        let n_sets = self.n_sets as u64;
        let block = address / block_size;
        Addr {
            offset: address % block_size,
            set: (block % n_sets) as usize,
            tag: block / n_sets,
        }
    }

    /// Inverse of [`Geometry::split_addr`] up to the block offset.
    pub fn block_addr(&self, tag: u64, set: usize) -> u64 {
        let block_size = self.block_size as u64;
        tag * block_size * self.n_sets as u64 + set as u64 * block_size
    }
}
