use crate::container::metadata::FieldWidths;
use crate::error::{PanelError, Result};
use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

type Blake2b8 = Blake2b<U8>;

/// Width of a hashed allele field: 8 digest bytes as hex.
pub const HASH_WIDTH: usize = 16;

/// One variant site. Alleles are carried as fixed-width blake2b-8 hex
/// digests so the table has a flat binary layout; the literal REF/ALT
/// strings are not reconstructable (the original IDs carry them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub chromosome: String,
    pub position: u64,
    pub ref_hash: String,
    pub alt_hash: String,
}

impl Variant {
    /// The id synthesized for archives that predate the `IDs` entry.
    pub fn synth_id(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.chromosome, self.position, self.ref_hash, self.alt_hash
        )
    }
}

/// 8-byte blake2b digest of an allele string, as 16 hex characters.
pub fn hash_allele(allele: &str) -> String {
    let mut hasher = Blake2b8::new();
    hasher.update(allele.as_bytes());
    hex::encode(hasher.finalize())
}

/// Schema for a table whose rows all carry `chromosome`.
pub fn schema_for(chromosome: &str) -> FieldWidths {
    vec![
        ("chr".to_string(), chromosome.len() as u32),
        ("pos".to_string(), 8),
        ("ref".to_string(), HASH_WIDTH as u32),
        ("alt".to_string(), HASH_WIDTH as u32),
    ]
}

fn field_width(schema: &FieldWidths, name: &str) -> Result<usize> {
    schema
        .iter()
        .find(|(n, _)| n == name)
        .map(|&(_, w)| w as usize)
        .ok_or_else(|| {
            PanelError::CorruptArchive(format!("variant schema is missing the '{name}' field"))
        })
}

fn record_width(schema: &FieldWidths) -> Result<(usize, usize)> {
    let chr_w = field_width(schema, "chr")?;
    if field_width(schema, "pos")? != 8 {
        return Err(PanelError::CorruptArchive(
            "variant schema declares a non-64-bit position".into(),
        ));
    }
    if field_width(schema, "ref")? != HASH_WIDTH || field_width(schema, "alt")? != HASH_WIDTH {
        return Err(PanelError::CorruptArchive(
            "variant schema declares non-16-hex allele hashes".into(),
        ));
    }
    Ok((chr_w, chr_w + 8 + 2 * HASH_WIDTH))
}

/// Serialize the variant table as the raw little-endian record image
/// declared by `schema`.
pub fn encode_table(variants: &[Variant], schema: &FieldWidths) -> Result<Vec<u8>> {
    let (chr_w, rec_w) = record_width(schema)?;
    let mut out = Vec::with_capacity(variants.len() * rec_w);
    for v in variants {
        let chr = v.chromosome.as_bytes();
        if chr.len() > chr_w {
            return Err(PanelError::InvariantViolation(format!(
                "chromosome '{}' wider than its declared field ({chr_w})",
                v.chromosome
            )));
        }
        if v.ref_hash.len() != HASH_WIDTH || v.alt_hash.len() != HASH_WIDTH {
            return Err(PanelError::InvariantViolation(
                "allele hash is not 16 hex characters".into(),
            ));
        }
        out.extend_from_slice(chr);
        out.extend(std::iter::repeat(0u8).take(chr_w - chr.len()));
        out.extend_from_slice(&v.position.to_le_bytes());
        out.extend_from_slice(v.ref_hash.as_bytes());
        out.extend_from_slice(v.alt_hash.as_bytes());
    }
    Ok(out)
}

pub fn decode_table(bytes: &[u8], schema: &FieldWidths) -> Result<Vec<Variant>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let (chr_w, rec_w) = record_width(schema)?;
    if bytes.len() % rec_w != 0 {
        return Err(PanelError::CorruptArchive(format!(
            "variant table size {} is not a multiple of the record width {rec_w}",
            bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(bytes.len() / rec_w);
    for rec in bytes.chunks_exact(rec_w) {
        let chr_end = rec[..chr_w].iter().position(|&b| b == 0).unwrap_or(chr_w);
        let chromosome = std::str::from_utf8(&rec[..chr_end])
            .map_err(|_| PanelError::CorruptArchive("chromosome is not UTF-8".into()))?
            .to_string();
        let position = u64::from_le_bytes(
            rec[chr_w..chr_w + 8]
                .try_into()
                .map_err(|_| PanelError::CorruptArchive("truncated position field".into()))?,
        );
        let hash_str = |field: &[u8]| -> Result<String> {
            std::str::from_utf8(field)
                .map(str::to_string)
                .map_err(|_| PanelError::CorruptArchive("allele hash is not UTF-8".into()))
        };
        out.push(Variant {
            chromosome,
            position,
            ref_hash: hash_str(&rec[chr_w + 8..chr_w + 8 + HASH_WIDTH])?,
            alt_hash: hash_str(&rec[chr_w + 8 + HASH_WIDTH..])?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(pos: u64, reference: &str, alternate: &str) -> Variant {
        Variant {
            chromosome: "chr1".into(),
            position: pos,
            ref_hash: hash_allele(reference),
            alt_hash: hash_allele(alternate),
        }
    }

    #[test]
    fn hash_is_16_hex() {
        let h = hash_allele("ACGTACGTACGTACGTACGT");
        assert_eq!(h.len(), HASH_WIDTH);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        // stable across calls, distinct across inputs
        assert_eq!(h, hash_allele("ACGTACGTACGTACGTACGT"));
        assert_ne!(hash_allele("A"), hash_allele("T"));
    }

    #[test]
    fn table_roundtrip() {
        let schema = schema_for("chr1");
        let table = vec![site(100, "A", "T"), site(200, "G", "CATTAG")];
        let bytes = encode_table(&table, &schema).unwrap();
        assert_eq!(bytes.len(), 2 * (4 + 8 + 32));
        assert_eq!(decode_table(&bytes, &schema).unwrap(), table);
    }

    #[test]
    fn empty_table() {
        let schema = schema_for("chr1");
        assert!(decode_table(&[], &schema).unwrap().is_empty());
    }

    #[test]
    fn size_mismatch_is_corrupt() {
        let schema = schema_for("chr1");
        let mut bytes = encode_table(&[site(1, "A", "C")], &schema).unwrap();
        bytes.pop();
        assert!(matches!(
            decode_table(&bytes, &schema),
            Err(PanelError::CorruptArchive(_))
        ));
    }

    #[test]
    fn synth_id_shape() {
        let v = site(100, "A", "T");
        let id = v.synth_id();
        assert!(id.starts_with("chr1-100-"));
        assert_eq!(id.split('-').count(), 4);
    }
}
