use crate::error::Result;
use std::io;

/// Default compression level for archive entry payloads.
pub const LEVEL: i32 = 3;

/// Compress a payload into a single zstd frame.
pub fn compress(src: &[u8], level: i32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len() / 2 + 64);
    let enc = zstd::stream::Encoder::new(&mut out, level.max(1))?;
    let mut w = enc.auto_finish();
    io::copy(&mut &src[..], &mut w)?;
    drop(w);
    Ok(out)
}

/// Decompress a single zstd frame back into its payload.
pub fn decompress(src: &[u8]) -> Result<Vec<u8>> {
    let mut dec = zstd::stream::Decoder::new(src)?;
    let mut out = Vec::new();
    io::copy(&mut dec, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let packed = compress(&payload, LEVEL).unwrap();
        assert!(packed.len() < payload.len());
        assert_eq!(decompress(&packed).unwrap(), payload);
    }

    #[test]
    fn empty_payload() {
        let packed = compress(&[], LEVEL).unwrap();
        assert_eq!(decompress(&packed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decompress(b"definitely not a zstd frame").is_err());
    }
}
