//! Part planner
//!
//! Splits a file size into contiguous byte ranges for a multipart upload.

use super::Part;

/// Maximum parts allowed in one multipart upload
pub const MAX_PARTS: u64 = 10000;

/// Split `total_size` bytes into parts of `part_size` bytes.
///
/// The returned parts are numbered from 1, ordered by offset and cover
/// `[0, total_size)` with no gap or overlap. If `part_size` would produce
/// [`MAX_PARTS`] or more parts, the part size is enlarged so the whole plan,
/// remainder included, stays below that limit.
///
/// `part_size` must be non-zero.
///
/// ```
/// use resumable_uploadr::upload::planner::plan_parts;
///
/// let mib = 1024 * 1024;
/// let parts = plan_parts(25 * mib, 10 * mib);
/// let sizes: Vec<u64> = parts.iter().map(|p| p.size).collect();
/// assert_eq!(sizes, vec![10 * mib, 10 * mib, 5 * mib]);
/// ```
pub fn plan_parts(total_size: u64, part_size: u64) -> Vec<Part> {
    assert!(part_size > 0, "part_size must be non-zero");

    let part_size = if total_size.div_ceil(part_size) >= MAX_PARTS {
        total_size.div_ceil(MAX_PARTS - 1)
    } else {
        part_size
    };
    let full_parts = total_size / part_size;
    let remainder = total_size % part_size;
    let mut parts = Vec::with_capacity(full_parts as usize + usize::from(remainder > 0));

    for index in 0..full_parts {
        parts.push(Part::new(index as u32 + 1, index * part_size, part_size));
    }

    if remainder > 0 {
        parts.push(Part::new(
            full_parts as u32 + 1,
            full_parts * part_size,
            remainder,
        ));
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn assert_partitions(total_size: u64, parts: &[Part]) {
        let mut expected_offset = 0;
        for (index, part) in parts.iter().enumerate() {
            assert_eq!(part.number as usize, index + 1);
            assert_eq!(part.offset, expected_offset);
            assert!(part.size > 0);
            assert!(!part.completed);
            expected_offset += part.size;
        }
        assert_eq!(expected_offset, total_size);
        assert!((parts.len() as u64) < MAX_PARTS);
    }

    #[test]
    fn test_empty_file_has_no_parts() {
        assert!(plan_parts(0, 10 * MIB).is_empty());
    }

    #[test]
    fn test_part_size_larger_than_file() {
        let parts = plan_parts(100, 10 * MIB);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 100);
        assert_eq!(parts[0].offset, 0);
    }

    #[test]
    fn test_part_size_equal_to_file() {
        let parts = plan_parts(10 * MIB, 10 * MIB);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 10 * MIB);
    }

    #[test]
    fn test_trailing_remainder() {
        let parts = plan_parts(25 * MIB, 10 * MIB);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].number, 3);
        assert_eq!(parts[2].offset, 20 * MIB);
        assert_eq!(parts[2].size, 5 * MIB);
        assert_partitions(25 * MIB, &parts);
    }

    #[test]
    fn test_exact_multiple() {
        let parts = plan_parts(30 * MIB, 10 * MIB);
        assert_eq!(parts.len(), 3);
        assert_partitions(30 * MIB, &parts);
    }

    #[test]
    fn test_part_count_capped() {
        let parts = plan_parts(100_000, 1);
        assert_eq!(parts.len(), 9091);
        assert_partitions(100_000, &parts);
    }

    #[test]
    fn test_part_count_capped_at_boundary() {
        // 10000 x 1 byte would hit the limit exactly
        let parts = plan_parts(10_000, 1);
        assert_partitions(10_000, &parts);

        let parts = plan_parts(9_999, 1);
        assert_eq!(parts.len(), 9_999);
    }

    #[test]
    fn test_remainder_counts_toward_cap() {
        // 9999 full parts plus a remainder would make 10000
        let parts = plan_parts(19_999, 2);
        assert!(parts.len() < MAX_PARTS as usize);
        assert_partitions(19_999, &parts);

        let parts = plan_parts(29_999, 3);
        assert!(parts.len() < MAX_PARTS as usize);
        assert_partitions(29_999, &parts);
    }

    #[test]
    fn test_large_file_small_parts() {
        let total = 5 * 1024 * 1024 * MIB + 7;
        let parts = plan_parts(total, MIB);
        assert_partitions(total, &parts);
    }

    #[test]
    fn test_partition_property_over_grid() {
        let sizes = [
            1, 2, 3, 7, 999, 1000, 1001, 9_998, 9_999, 10_000, 10_001, 19_999, 29_999, 123_457,
            99_990_001,
        ];
        let part_sizes = [1, 2, 3, 10, 1000, 4096, 1 << 20];
        for &total in &sizes {
            for &part_size in &part_sizes {
                assert_partitions(total, &plan_parts(total, part_size));
            }
        }
    }

    #[test]
    #[should_panic(expected = "part_size must be non-zero")]
    fn test_zero_part_size_panics() {
        plan_parts(10, 0);
    }
}
