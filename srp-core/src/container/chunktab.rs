use crate::error::{PanelError, Result};

/// Bytes per chunk-index entry: three little-endian u64 values.
pub const SPAN_SIZE: usize = 24;

/// One chunk-index entry: the chunk id and the genomic positions of the
/// chunk's first and last variant (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub id: u64,
    pub first_pos: u64,
    pub last_pos: u64,
}

pub fn write_table(spans: &[ChunkSpan]) -> Vec<u8> {
    let mut out = Vec::with_capacity(spans.len() * SPAN_SIZE);
    for s in spans {
        out.extend_from_slice(&s.id.to_le_bytes());
        out.extend_from_slice(&s.first_pos.to_le_bytes());
        out.extend_from_slice(&s.last_pos.to_le_bytes());
    }
    out
}

pub fn read_table(bytes: &[u8]) -> Result<Vec<ChunkSpan>> {
    if bytes.len() % SPAN_SIZE != 0 {
        return Err(PanelError::CorruptArchive(format!(
            "chunk index size {} is not a multiple of {SPAN_SIZE}",
            bytes.len()
        )));
    }
    let le64 = |x: &[u8]| u64::from_le_bytes(x.try_into().expect("8-byte window"));
    let mut out: Vec<ChunkSpan> = Vec::with_capacity(bytes.len() / SPAN_SIZE);
    for (i, rec) in bytes.chunks_exact(SPAN_SIZE).enumerate() {
        let span = ChunkSpan {
            id: le64(&rec[0..8]),
            first_pos: le64(&rec[8..16]),
            last_pos: le64(&rec[16..24]),
        };
        // Ids are contiguous from 0 and first_pos is monotone.
        if span.id != i as u64 {
            return Err(PanelError::CorruptArchive(format!(
                "chunk index entry {i} carries id {}",
                span.id
            )));
        }
        if let Some(prev) = out.last() {
            if span.first_pos < prev.first_pos {
                return Err(PanelError::CorruptArchive(
                    "chunk index positions are not monotone".into(),
                ));
            }
        }
        out.push(span);
    }
    Ok(out)
}

/// The chunk whose span covers `pos`, by binary search on `first_pos`.
pub fn span_for_position(spans: &[ChunkSpan], pos: u64) -> Option<&ChunkSpan> {
    let idx = spans.partition_point(|s| s.first_pos <= pos);
    let candidate = spans[..idx].last()?;
    (pos <= candidate.last_pos).then_some(candidate)
}
