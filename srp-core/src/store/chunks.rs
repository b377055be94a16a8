use crate::error::{PanelError, Result};
use crate::sparse::csc::CscMatrix;

/// Magic prefix of a serialized haplotype chunk.
pub const CHUNK_MAGIC: &[u8; 4] = b"SPC1";

/// Serialize a CSC chunk. Values are all `true`, so only the nonzero
/// structure goes to disk: rows/cols/nnz header, column pointers, row
/// indices, everything little-endian.
pub fn encode_chunk(m: &CscMatrix) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(4 + 24 + (m.cols() + 1) * 8 + m.nnz() * 4);
    out.extend_from_slice(CHUNK_MAGIC);
    out.extend_from_slice(&(m.rows() as u64).to_le_bytes());
    out.extend_from_slice(&(m.cols() as u64).to_le_bytes());
    out.extend_from_slice(&(m.nnz() as u64).to_le_bytes());
    for &p in m.indptr() {
        out.extend_from_slice(&(p as u64).to_le_bytes());
    }
    for &r in m.indices() {
        out.extend_from_slice(&r.to_le_bytes());
    }
    out
}

fn corrupt(msg: impl Into<String>) -> PanelError {
    PanelError::CorruptArchive(msg.into())
}

pub fn decode_chunk(bytes: &[u8]) -> Result<CscMatrix> {
    if bytes.len() < 4 + 24 {
        return Err(corrupt("chunk blob shorter than its header"));
    }
    if bytes[..4] != CHUNK_MAGIC[..] {
        return Err(corrupt("chunk blob has a bad magic"));
    }
    let le64 = |off: usize| {
        u64::from_le_bytes(bytes[off..off + 8].try_into().expect("8-byte window")) as usize
    };
    let rows = le64(4);
    let cols = le64(12);
    let nnz = le64(20);

    let indptr_off = 28usize;
    let expected = (cols as u64)
        .checked_add(1)
        .and_then(|p| p.checked_mul(8))
        .and_then(|p| p.checked_add((nnz as u64).checked_mul(4)?))
        .and_then(|p| p.checked_add(indptr_off as u64))
        .ok_or_else(|| corrupt("chunk blob header size overflow"))?;
    if bytes.len() as u64 != expected {
        return Err(corrupt(format!(
            "chunk blob is {} bytes, expected {expected}",
            bytes.len()
        )));
    }
    let indices_off = indptr_off + (cols + 1) * 8;

    let indptr: Vec<usize> = (0..=cols).map(|c| le64(indptr_off + c * 8)).collect();
    let indices: Vec<u32> = bytes[indices_off..]
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes(w.try_into().expect("4-byte window")))
        .collect();

    CscMatrix::from_parts(rows, cols, indptr, indices)
        .map_err(|e| corrupt(format!("chunk blob structure: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CscMatrix {
        CscMatrix::from_rows(&[
            vec![true, false, false, false],
            vec![true, true, false, true],
            vec![false, false, true, true],
        ])
        .unwrap()
    }

    #[test]
    fn roundtrip() {
        let m = sample();
        assert_eq!(decode_chunk(&encode_chunk(&m)).unwrap(), m);
    }

    #[test]
    fn roundtrip_empty() {
        let m = CscMatrix::zeros(0, 0);
        assert_eq!(decode_chunk(&encode_chunk(&m)).unwrap(), m);
    }

    #[test]
    fn bad_magic() {
        let mut blob = encode_chunk(&sample());
        blob[0] = b'X';
        assert!(matches!(
            decode_chunk(&blob),
            Err(PanelError::CorruptArchive(_))
        ));
    }

    #[test]
    fn truncated_blob() {
        let mut blob = encode_chunk(&sample());
        blob.truncate(blob.len() - 3);
        assert!(decode_chunk(&blob).is_err());
    }

    #[test]
    fn inconsistent_structure() {
        // nnz in the header no longer matches indptr's tail
        let m = sample();
        let mut blob = encode_chunk(&m);
        let tail = 28 + m.cols() * 8;
        blob[tail..tail + 8].copy_from_slice(&0u64.to_le_bytes());
        assert!(decode_chunk(&blob).is_err());
    }
}
