/*! UCSC genomic binning.

The store indexes features by a coarse bin number computed from their
coordinates, which turns interval-overlap queries into a handful of indexed
equality scans. The scheme is the standard UCSC one: a five-level hierarchy
of bins spanning 128 kb up to 512 Mb, numbered 0, 1-8, 9-72, 73-584 and
585-4680.

All functions here take zero-based, half-open coordinates.
*/

/// Bin offsets from the widest level down to the narrowest.
const BIN_OFFSETS: &'static [u32] = &[585, 73, 9, 1, 0];

/// Shift of the narrowest (128 kb) bin level.
const BIN_FIRST_SHIFT: u32 = 17;

/// Shift increment between consecutive bin levels.
const BIN_NEXT_SHIFT: u32 = 3;

/// Largest coordinate representable in the scheme.
const BIN_MAX_END: u64 = 1 << 29;

/// Returns the smallest bin fully containing the interval.
///
/// Intervals reaching beyond the 512 Mb range fall back to the widest bin.
pub fn bin_from_range(start: u64, end: u64) -> u32 {
    if end > BIN_MAX_END {
        return BIN_OFFSETS[BIN_OFFSETS.len() - 1];
    }
    let end = if end > start { end - 1 } else { start };

    let mut start_bin = start >> BIN_FIRST_SHIFT;
    let mut end_bin = end >> BIN_FIRST_SHIFT;
    for offset in BIN_OFFSETS.iter().take(BIN_OFFSETS.len() - 1) {
        if start_bin == end_bin {
            return offset + start_bin as u32;
        }
        start_bin >>= BIN_NEXT_SHIFT;
        end_bin >>= BIN_NEXT_SHIFT;
    }
    BIN_OFFSETS[BIN_OFFSETS.len() - 1]
}

/// Returns every bin whose span intersects the interval.
///
/// Features overlapping the interval are guaranteed to carry one of the
/// returned bin numbers, so the result can back a SQL `IN` filter.
pub fn bins_for_range(start: u64, end: u64) -> Vec<u32> {
    let mut bins = Vec::new();
    if start >= end {
        return bins;
    }
    let end = if end > BIN_MAX_END { BIN_MAX_END } else { end };

    let mut start_bin = start >> BIN_FIRST_SHIFT;
    let mut end_bin = (end - 1) >> BIN_FIRST_SHIFT;
    for offset in BIN_OFFSETS.iter().take(BIN_OFFSETS.len() - 1) {
        let mut bin = start_bin;
        while bin <= end_bin {
            bins.push(offset + bin as u32);
            bin += 1;
        }
        start_bin >>= BIN_NEXT_SHIFT;
        end_bin >>= BIN_NEXT_SHIFT;
    }
    bins.push(BIN_OFFSETS[BIN_OFFSETS.len() - 1]);
    bins
}
