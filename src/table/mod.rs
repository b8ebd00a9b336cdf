//! Cumulative offset tables.
//!
//! A table holds `table_size` little-endian u64 entries.  Entry `i` is the
//! running total of block sizes `0..=i`, so block `i` spans
//! `[table[i-1], table[i])` with `table[-1] = 0`.  Slots past the last block
//! repeat the final total and therefore describe zero-length blocks.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, XbcfError};

/// Running per-block sizes collected by a writer, fixed capacity.
#[derive(Debug, Clone)]
pub struct SizeTable {
    sizes: Vec<u64>,
    used:  usize,
}

impl SizeTable {
    pub fn new(table_size: u64) -> Self {
        Self { sizes: vec![0; table_size as usize], used: 0 }
    }

    /// Record the size of the next block and return its index.
    pub fn push(&mut self, size: u64) -> Result<usize> {
        let capacity = self.sizes.len();
        if self.used == capacity {
            return Err(XbcfError::TableExhausted { capacity: capacity as u64 });
        }
        self.sizes[self.used] = size;
        self.used += 1;
        Ok(self.used - 1)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_full(&self) -> bool {
        self.used == self.sizes.len()
    }

    pub fn total(&self) -> u64 {
        self.sizes[..self.used].iter().sum()
    }

    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_table(&self.sizes, self.sizes.len() as u64)
    }
}

/// Encode per-block sizes as a cumulative table of exactly `table_size`
/// slots.  Missing trailing sizes count as zero.
pub fn encode_table(sizes: &[u64], table_size: u64) -> Result<Vec<u8>> {
    let slots = table_size as usize;
    if sizes.len() > slots {
        return Err(XbcfError::TableExhausted { capacity: table_size });
    }
    let mut out = vec![0u8; slots * 8];
    let mut running = 0u64;
    for (i, chunk) in out.chunks_exact_mut(8).enumerate() {
        let size = sizes.get(i).copied().unwrap_or(0);
        running = running
            .checked_add(size)
            .ok_or_else(|| XbcfError::CorruptTable("cumulative offset overflows u64".into()))?;
        LittleEndian::write_u64(chunk, running);
    }
    Ok(out)
}

/// Decode a cumulative table, checking its length and monotonicity.
pub fn decode_table(bytes: &[u8], table_size: u64) -> Result<OffsetTable> {
    let expected = table_size as usize * 8;
    if bytes.len() != expected {
        return Err(XbcfError::CorruptTable(format!(
            "table holds {} bytes, header implies {expected}", bytes.len()
        )));
    }
    let ends: Vec<u64> = bytes.chunks_exact(8).map(LittleEndian::read_u64).collect();
    if let Some(i) = ends.windows(2).position(|w| w[1] < w[0]) {
        return Err(XbcfError::CorruptTable(format!(
            "offset {} at slot {} is below offset {} at slot {i}", ends[i + 1], i + 1, ends[i]
        )));
    }
    Ok(OffsetTable { ends })
}

/// Decoded cumulative offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    ends: Vec<u64>,
}

impl OffsetTable {
    pub fn ends(&self) -> &[u64] {
        &self.ends
    }

    /// Per-block sizes: adjacent differences, the first measured from zero.
    pub fn sizes(&self) -> Vec<u64> {
        let mut prev = 0;
        self.ends
            .iter()
            .map(|&end| {
                let size = end - prev;
                prev = end;
                size
            })
            .collect()
    }

    pub fn start(&self, index: usize) -> u64 {
        match index {
            0 => 0,
            i => self.ends[i - 1],
        }
    }

    /// `(start, len)` of block `index`, or `None` past the last slot.
    pub fn range(&self, index: usize) -> Option<(u64, u64)> {
        let end = *self.ends.get(index)?;
        let start = self.start(index);
        Some((start, end - start))
    }

    /// Number of leading non-empty blocks.  A non-empty block after an
    /// empty one means the table was not produced by a writer.
    pub fn used_blocks(&self) -> Result<usize> {
        let sizes = self.sizes();
        let used = sizes.iter().take_while(|&&s| s > 0).count();
        if let Some(hole) = sizes[used..].iter().position(|&s| s > 0) {
            return Err(XbcfError::CorruptTable(format!(
                "block {} follows unused slot {used}", used + hole
            )));
        }
        Ok(used)
    }

    /// Total covered by the first `blocks` slots.
    pub fn total(&self, blocks: usize) -> u64 {
        self.start(blocks)
    }

    /// First block among the first `blocks` whose end exceeds `pos`.
    /// Returns `blocks` when `pos` lies at or past the end.
    pub fn locate(&self, pos: u64, blocks: usize) -> usize {
        self.ends[..blocks].partition_point(|&end| end <= pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_cumulative_sums() {
        let raw = encode_table(&[10, 20, 5], 5).unwrap();
        assert_eq!(raw.len(), 40);
        let table = decode_table(&raw, 5).unwrap();
        assert_eq!(table.ends(), &[10, 30, 35, 35, 35]);
        assert_eq!(table.sizes(), vec![10, 20, 5, 0, 0]);
        assert_eq!(table.used_blocks().unwrap(), 3);
        assert_eq!(table.range(1), Some((10, 20)));
        assert_eq!(table.range(3), Some((35, 0)));
        assert_eq!(table.range(5), None);
        assert_eq!(table.total(3), 35);
    }

    #[test]
    fn length_mismatch_is_corrupt() {
        let raw = encode_table(&[1], 4).unwrap();
        assert!(matches!(decode_table(&raw[..24], 4), Err(XbcfError::CorruptTable(_))));
    }

    #[test]
    fn decreasing_offsets_are_corrupt() {
        let mut raw = encode_table(&[10, 20], 3).unwrap();
        LittleEndian::write_u64(&mut raw[8..16], 5);
        assert!(matches!(decode_table(&raw, 3), Err(XbcfError::CorruptTable(_))));
    }

    #[test]
    fn holes_are_corrupt() {
        let raw = encode_table(&[10, 0, 7], 3).unwrap();
        let table = decode_table(&raw, 3).unwrap();
        assert!(matches!(table.used_blocks(), Err(XbcfError::CorruptTable(_))));
    }

    #[test]
    fn zero_table_has_no_blocks() {
        let table = decode_table(&[0u8; 32], 4).unwrap();
        assert_eq!(table.used_blocks().unwrap(), 0);
        assert_eq!(table.locate(0, 0), 0);
    }

    #[test]
    fn locate_skips_empty_blocks() {
        // logical sizes 7, 0, 12
        let table = decode_table(&encode_table(&[7, 0, 12], 4).unwrap(), 4).unwrap();
        assert_eq!(table.locate(0, 3), 0);
        assert_eq!(table.locate(6, 3), 0);
        assert_eq!(table.locate(7, 3), 2);
        assert_eq!(table.locate(18, 3), 2);
        assert_eq!(table.locate(19, 3), 3);
    }

    #[test]
    fn size_table_enforces_capacity() {
        let mut t = SizeTable::new(2);
        assert_eq!(t.push(4).unwrap(), 0);
        assert_eq!(t.push(6).unwrap(), 1);
        assert!(t.is_full());
        assert!(matches!(t.push(1), Err(XbcfError::TableExhausted { capacity: 2 })));
        assert_eq!(t.total(), 10);
    }
}
