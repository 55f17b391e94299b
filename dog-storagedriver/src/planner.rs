use crate::{ChunkRules, DriverError, DriverResult};

/// Where a resumed write picks up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// Already-committed parts that stay in the session
    pub kept_parts: usize,

    /// Number of the next part to upload
    pub next_part: u32,
}

/// Chunk sizing and resume validation for one store's part constants
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkPlanner {
    rules: ChunkRules,
}

impl ChunkPlanner {
    pub fn new(rules: ChunkRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> ChunkRules {
        self.rules
    }

    /// Smallest power-of-two multiple of the minimum part size that fits
    /// `total_size` into the part limit.
    ///
    /// Always doubles from the minimum so that every write of the same total
    /// lands on the same chunk size, which is what lets a resume line up with
    /// the parts an earlier call committed.
    pub fn derive_chunk_size(&self, total_size: u64) -> u64 {
        let max_parts = self.rules.max_parts.max(1);
        let mut chunk_size = self.rules.min_part_size.max(1);
        while total_size / chunk_size >= max_parts {
            chunk_size *= 2;
        }
        chunk_size
    }

    /// Reject offsets the store cannot resume from.
    ///
    /// Only whole parts can be replaced or appended, so an unfinished write
    /// must resume on a chunk boundary within the parts already committed.
    /// An offset past the declared size is never valid.
    pub fn validate_resume(
        &self,
        path: &str,
        offset: u64,
        size: u64,
        existing_parts: usize,
        chunk_size: u64,
    ) -> DriverResult<()> {
        let committed_limit = existing_parts as u64 * chunk_size;
        if offset > size
            || offset > committed_limit
            || (offset < size && offset % chunk_size != 0)
        {
            return Err(DriverError::invalid_offset(path, offset));
        }
        Ok(())
    }

    /// Parts to keep and the next part number for an already validated offset
    pub fn resume_point(&self, offset: u64, size: u64, chunk_size: u64) -> ResumePoint {
        // A finished write keeps its short final part too
        let kept = if offset == size {
            offset.div_ceil(chunk_size)
        } else {
            offset / chunk_size
        };

        ResumePoint {
            kept_parts: kept as usize,
            next_part: kept as u32 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MB: u64 = 1024 * 1024;

    fn planner() -> ChunkPlanner {
        ChunkPlanner::new(ChunkRules::default())
    }

    #[test]
    fn test_small_writes_use_minimum() {
        let p = planner();
        assert_eq!(p.derive_chunk_size(0), 5 * MB);
        assert_eq!(p.derive_chunk_size(12 * MB), 5 * MB);
        assert_eq!(p.derive_chunk_size(5 * MB * 999), 5 * MB);
    }

    #[test]
    fn test_doubles_at_part_limit() {
        let p = planner();
        assert_eq!(p.derive_chunk_size(5 * MB * 1000), 10 * MB);
        assert_eq!(p.derive_chunk_size(10 * MB * 1000), 20 * MB);
    }

    #[test]
    fn test_validate_resume() {
        let p = planner();
        let chunk = 5 * MB;

        assert!(p.validate_resume("a", 0, 12 * MB, 0, chunk).is_ok());
        assert!(p.validate_resume("a", 10 * MB, 12 * MB, 2, chunk).is_ok());

        // beyond committed parts
        let err = p.validate_resume("a", 10 * MB, 12 * MB, 1, chunk).unwrap_err();
        assert!(matches!(err, DriverError::InvalidOffset { offset, .. } if offset == 10 * MB));

        // misaligned and unfinished
        assert!(p.validate_resume("a", 7 * MB, 12 * MB, 2, chunk).is_err());

        // misaligned but at the declared size
        assert!(p.validate_resume("a", 12 * MB, 12 * MB, 3, chunk).is_ok());
    }

    #[test]
    fn test_offset_past_size_rejected() {
        let p = ChunkPlanner::new(ChunkRules::new().with_min_part_size(4));

        // three committed parts cover the offset, but the declared size is smaller
        let err = p.validate_resume("f", 12, 10, 3, 4).unwrap_err();
        assert!(matches!(err, DriverError::InvalidOffset { offset: 12, .. }));
        assert!(p.validate_resume("f", 11, 10, 3, 4).is_err());
    }

    #[test]
    fn test_zero_max_parts_treated_as_one() {
        let p = ChunkPlanner::new(ChunkRules::new().with_min_part_size(4).with_max_parts(0));
        assert_eq!(p.derive_chunk_size(0), 4);
        assert_eq!(p.derive_chunk_size(3), 4);
        assert_eq!(p.derive_chunk_size(10), 16);
    }

    #[test]
    fn test_resume_point() {
        let p = planner();
        let chunk = 5 * MB;

        assert_eq!(
            p.resume_point(10 * MB, 12 * MB, chunk),
            ResumePoint { kept_parts: 2, next_part: 3 }
        );
        assert_eq!(
            p.resume_point(0, 12 * MB, chunk),
            ResumePoint { kept_parts: 0, next_part: 1 }
        );
        assert_eq!(
            p.resume_point(12 * MB, 12 * MB, chunk),
            ResumePoint { kept_parts: 3, next_part: 4 }
        );
    }

    proptest! {
        #[test]
        fn chunk_size_fits_part_limit(size in 0u64..(u64::MAX / 4)) {
            let p = planner();
            let chunk = p.derive_chunk_size(size);
            prop_assert!(chunk >= 5 * MB);
            prop_assert!(size.div_ceil(chunk) <= 1000);
            prop_assert_eq!(chunk, p.derive_chunk_size(size));
        }

        #[test]
        fn chunk_size_is_smallest_doubling(size in 0u64..(1u64 << 50)) {
            let p = planner();
            let chunk = p.derive_chunk_size(size);
            prop_assert!((chunk / (5 * MB)).is_power_of_two());
            if chunk > 5 * MB {
                prop_assert!(size / (chunk / 2) >= 1000);
            }
        }
    }
}
