use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Default number of variant rows per chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

/// Field-name/byte-width schema of the on-disk variant table.
pub type FieldWidths = Vec<(String, u32)>;

/// The `metadata` archive entry: a UTF-8 JSON document. Every field is
/// defaulted so that empty and older archives still parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub chromosome: String,
    #[serde(default)]
    pub n_variants: u64,
    #[serde(default)]
    pub n_haps: u64,
    #[serde(default)]
    pub n_samples: u64,
    #[serde(default)]
    pub n_chunks: u64,
    #[serde(default)]
    pub chunk_size: u64,
    #[serde(default)]
    pub min_position: u64,
    #[serde(default)]
    pub max_position: u64,
    #[serde(default)]
    pub variant_dtypes: FieldWidths,
    #[serde(default)]
    pub contig_field: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Metadata {
    /// Fresh metadata for a newly created, still-empty archive.
    pub fn new_created() -> Self {
        Self {
            created_at: timestamp(),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e).into())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PanelError::CorruptArchive(format!("metadata is not valid JSON: {e}")))
    }

    /// The variant-record schema, falling back to the historical default
    /// when the archive predates the `variant_dtypes` field.
    pub fn variant_schema(&self) -> FieldWidths {
        if self.variant_dtypes.is_empty() {
            default_schema()
        } else {
            self.variant_dtypes.clone()
        }
    }
}

pub fn default_schema() -> FieldWidths {
    vec![
        ("chr".to_string(), 21),
        ("pos".to_string(), 8),
        ("ref".to_string(), 16),
        ("alt".to_string(), 16),
    ]
}

/// RFC 3339 wall-clock timestamp.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let mut meta = Metadata::new_created();
        meta.chromosome = "chr20".into();
        meta.n_variants = 7;
        meta.variant_dtypes = vec![("chr".into(), 5), ("pos".into(), 8)];
        let parsed = Metadata::from_json(&meta.to_json().unwrap()).unwrap();
        assert_eq!(parsed.chromosome, "chr20");
        assert_eq!(parsed.n_variants, 7);
        assert_eq!(parsed.variant_dtypes.len(), 2);
    }

    #[test]
    fn sparse_document_defaults() {
        let meta = Metadata::from_json(br#"{"created_at":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(meta.n_variants, 0);
        assert_eq!(meta.variant_schema(), default_schema());
    }

    #[test]
    fn bad_json_is_corrupt() {
        assert!(matches!(
            Metadata::from_json(b"not json"),
            Err(PanelError::CorruptArchive(_))
        ));
    }
}
