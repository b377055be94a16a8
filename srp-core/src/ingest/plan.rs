/// Stand-in chromosome length (100 Gb) used when the upstream index does
/// not know the real one, and as the widened upper bound of the final
/// range so trailing variants are never dropped.
pub const MAX_CHROM_LENGTH: u64 = 100_000_000_000;

/// Plan the inclusive base-pair ranges the variant ingest will query in
/// parallel. Each range is sized so that it holds roughly `chunk_size`
/// variants under a uniform-density estimate; the actual chunk discipline
/// is enforced later by the per-chunk row-count check, not here.
pub fn chunk_ranges(
    first_pos: u64,
    chr_length: u64,
    n_variants: u64,
    chunk_size: u64,
) -> Vec<(u64, u64)> {
    if n_variants == 0 {
        return Vec::new();
    }
    let bp_per_variant = chr_length as f64 / n_variants as f64;
    let bp_per_chunk = bp_per_variant * chunk_size as f64;
    let mut ranges = Vec::new();
    let mut current = first_pos as f64;
    while (current as u64) < chr_length {
        let end = (current + bp_per_chunk).min(chr_length as f64);
        ranges.push((current as u64, end as u64));
        current = end + 1.0;
    }
    // Widen the last range so variants past the estimated length survive.
    if let Some(last) = ranges.last_mut() {
        last.1 = MAX_CHROM_LENGTH;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_the_chromosome() {
        let ranges = chunk_ranges(1, 1_000, 100, 10);
        // bp_per_chunk = 100
        assert_eq!(ranges.first(), Some(&(1, 101)));
        assert_eq!(ranges[1].0, 102);
        for w in ranges.windows(2) {
            assert_eq!(w[1].0, w[0].1 + 1);
        }
        assert_eq!(ranges.last().unwrap().1, MAX_CHROM_LENGTH);
    }

    #[test]
    fn single_range_is_still_widened() {
        let ranges = chunk_ranges(5, 100, 10, 1_000);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0], (5, MAX_CHROM_LENGTH));
    }

    #[test]
    fn unknown_length_fallback() {
        let ranges = chunk_ranges(100, MAX_CHROM_LENGTH, 1_000_000, 10_000);
        assert!(!ranges.is_empty());
        assert_eq!(ranges.last().unwrap().1, MAX_CHROM_LENGTH);
    }

    #[test]
    fn no_variants_no_ranges() {
        assert!(chunk_ranges(1, 1_000, 0, 10).is_empty());
    }

    #[test]
    fn start_past_length() {
        assert!(chunk_ranges(2_000, 1_000, 10, 10).is_empty());
    }
}
