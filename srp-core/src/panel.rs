use crate::container::archive::{
    ArchiveFile, ENTRY_CHUNKS, ENTRY_IDS, ENTRY_METADATA, ENTRY_ORIGINAL_IDS, ENTRY_SAMPLE_IDS,
    ENTRY_VARIANTS, haplotype_entry, split_lines,
};
use crate::container::chunktab::{self, ChunkSpan};
use crate::container::metadata::Metadata;
use crate::container::variants::{self, Variant};
use crate::error::{PanelError, Result};
use crate::ingest::pipeline;
use crate::ingest::upstream::{BcfTool, UpstreamTool, XsiTool};
use crate::select::{ColSelector, RowSelector, chunk_local_stop, stepped};
use crate::sparse::csc::CscMatrix;
use crate::sparse::csr::CsrMatrix;
use crate::store::cache::{ChunkCache, DEFAULT_CAPACITY};
use crate::store::chunks::decode_chunk;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use crate::ingest::pipeline::ConvertOptions;

/// Dense row-major dosage block; values in `{0, 1, 2}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosageBlock {
    pub rows: usize,
    pub samples: usize,
    values: Vec<u8>,
}

impl DosageBlock {
    pub fn get(&self, row: usize, sample: usize) -> u8 {
        self.values[row * self.samples + sample]
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }
}

/// A single-chromosome reference panel stored as chunked boolean sparse
/// matrices in a compressed archive.
///
/// The small entries (metadata, variant table, chunk index, IDs) load
/// eagerly at open; haplotype chunks decode lazily through a bounded LRU
/// cache. The archive is immutable once written, so everything handed out
/// is safe to keep across cache evictions.
pub struct SparseRefPanel {
    archive: ArchiveFile,
    metadata: Metadata,
    variants: Vec<Variant>,
    positions: Vec<u64>,
    spans: Vec<ChunkSpan>,
    ids: Vec<String>,
    original_ids: Vec<String>,
    sample_ids: Vec<String>,
    cache: ChunkCache,
}

impl std::fmt::Debug for SparseRefPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseRefPanel")
            .field("path", &self.archive.path())
            .field("shape", &self.shape())
            .finish()
    }
}

impl SparseRefPanel {
    /// Open an archive, creating an empty one if the path does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CAPACITY)
    }

    pub fn open_with_cache(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "creating new sparse panel archive");
            crate::container::archive::create_empty(path)?;
        }
        let archive = ArchiveFile::new(path);

        let metadata = Metadata::from_json(&archive.read(ENTRY_METADATA)?)?;
        let schema = metadata.variant_schema();
        let variants = variants::decode_table(&archive.read(ENTRY_VARIANTS)?, &schema)?;
        let spans = chunktab::read_table(&archive.read(ENTRY_CHUNKS)?)?;

        if variants.len() as u64 != metadata.n_variants {
            return Err(PanelError::CorruptArchive(format!(
                "variant table holds {} records, metadata says {}",
                variants.len(),
                metadata.n_variants
            )));
        }
        if spans.len() as u64 != metadata.n_chunks {
            return Err(PanelError::CorruptArchive(format!(
                "chunk index holds {} entries, metadata says {}",
                spans.len(),
                metadata.n_chunks
            )));
        }
        if metadata.n_variants > 0 && metadata.chunk_size == 0 {
            return Err(PanelError::CorruptArchive(
                "metadata declares variants but no chunk size".into(),
            ));
        }

        let ids = match archive.read_optional(ENTRY_IDS)? {
            Some(bytes) => split_lines(&bytes),
            None => variants.iter().map(Variant::synth_id).collect(),
        };
        let original_ids = match archive.read_optional(ENTRY_ORIGINAL_IDS)? {
            Some(bytes) => split_lines(&bytes),
            None => ids.clone(),
        };
        let sample_ids = match archive.read_optional(ENTRY_SAMPLE_IDS)? {
            Some(bytes) => split_lines(&bytes),
            None => {
                warn!("'sample_ids' entry not found in the archive");
                Vec::new()
            }
        };

        let positions = variants.iter().map(|v| v.position).collect();
        Ok(Self {
            archive,
            metadata,
            variants,
            positions,
            spans,
            ids,
            original_ids,
            sample_ids,
            cache: ChunkCache::new(cache_size),
        })
    }

    /// Convert a VCF/BCF file into this archive. A no-op when the archive
    /// already holds variants and `replace_file` is off.
    pub fn from_bcf(self, bcf_path: impl AsRef<Path>, opts: &ConvertOptions) -> Result<Self> {
        let bcf_path = bcf_path.as_ref();
        if !self.needs_convert(opts) {
            return Ok(self);
        }
        if !bcf_path.exists() {
            return Err(PanelError::FileNotFound(bcf_path.to_path_buf()));
        }
        let tool = BcfTool::new(bcf_path);
        tool.ensure_index(opts.threads)?;
        self.convert_with(&tool, opts)
    }

    /// Convert an xsi file into this archive (genotypes through
    /// `xsqueezeit`, metadata through the `<base>_var.bcf` sidecar).
    pub fn from_xsi(self, xsi_path: impl AsRef<Path>, opts: &ConvertOptions) -> Result<Self> {
        let xsi_path = xsi_path.as_ref();
        if !self.needs_convert(opts) {
            return Ok(self);
        }
        if !xsi_path.exists() {
            return Err(PanelError::FileNotFound(xsi_path.to_path_buf()));
        }
        let tool = XsiTool::new(xsi_path)?;
        self.convert_with(&tool, opts)
    }

    /// Run the ingestion pipeline against an arbitrary upstream tool and
    /// reopen the rewritten archive.
    pub fn convert_with(self, tool: &dyn UpstreamTool, opts: &ConvertOptions) -> Result<Self> {
        if !self.needs_convert(opts) {
            return Ok(self);
        }
        let path = self.archive.path().to_path_buf();
        let capacity = self.cache.capacity();
        pipeline::convert(&path, tool, opts, self.metadata.clone())?;
        Self::open_with_cache(path, capacity)
    }

    fn needs_convert(&self, opts: &ConvertOptions) -> bool {
        if self.n_variants() > 0 && !opts.replace_file {
            info!("variants have already been loaded");
            return false;
        }
        true
    }

    pub fn n_variants(&self) -> usize {
        self.metadata.n_variants as usize
    }

    pub fn n_haps(&self) -> usize {
        self.metadata.n_haps as usize
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_chunks(&self) -> usize {
        self.metadata.n_chunks as usize
    }

    pub fn chunk_size(&self) -> usize {
        self.metadata.chunk_size as usize
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_variants(), self.n_haps())
    }

    pub fn empty(&self) -> bool {
        self.n_variants() == 0 || self.n_haps() == 0
    }

    pub fn chromosome(&self) -> &str {
        &self.metadata.chromosome
    }

    pub fn contig_field(&self) -> &str {
        &self.metadata.contig_field
    }

    pub fn min_position(&self) -> u64 {
        self.metadata.min_position
    }

    pub fn max_position(&self) -> u64 {
        self.metadata.max_position
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn original_ids(&self) -> &[String] {
        &self.original_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn is_valid_chunk(&self, chunk_id: u64) -> bool {
        (chunk_id as usize) < self.spans.len()
    }

    /// The decoded chunk, through the cache.
    fn load_chunk(&self, chunk_id: u64) -> Result<Arc<CscMatrix>> {
        if !self.is_valid_chunk(chunk_id) {
            return Err(PanelError::IndexOutOfRange(format!(
                "chunk {chunk_id} out of range for {} chunks",
                self.spans.len()
            )));
        }
        self.cache.get_or_load(chunk_id, || {
            debug!(chunk = chunk_id, "decoding haplotype chunk");
            decode_chunk(&self.archive.read(&haplotype_entry(chunk_id))?)
        })
    }

    /// The submatrix named by a row and a column selector.
    pub fn slice(&self, rows: &RowSelector, cols: &ColSelector) -> Result<CscMatrix> {
        match rows {
            RowSelector::Single(r) => {
                if *r >= self.n_variants() {
                    return Err(PanelError::IndexOutOfRange(format!(
                        "index {r} out of range for {} variants",
                        self.n_variants()
                    )));
                }
                let cs = self.chunk_size();
                let chunk = self.load_chunk((r / cs) as u64)?;
                let picked = chunk.to_csr().select_rows(&[r % cs])?;
                self.apply_cols(picked.to_csc(), cols)
            }
            RowSelector::Slice { start, stop, step } => {
                self.slice_rows(*start, *stop, *step, cols)
            }
            RowSelector::Indices(list) => self.take_rows(list, cols),
        }
    }

    /// One row restricted to a column selector.
    pub fn row(&self, idx: usize, cols: &ColSelector) -> Result<CscMatrix> {
        self.slice(&RowSelector::Single(idx), cols)
    }

    /// The full matrix, stacked in chunk order.
    pub fn all(&self) -> Result<CscMatrix> {
        let mut chunks = Vec::with_capacity(self.spans.len());
        for span in &self.spans {
            chunks.push(self.load_chunk(span.id)?);
        }
        if chunks.is_empty() {
            return Ok(CscMatrix::zeros(0, self.n_haps()));
        }
        let parts: Vec<&CscMatrix> = chunks.iter().map(Arc::as_ref).collect();
        CscMatrix::vstack(&parts)
    }

    /// All rows whose position falls in `[min_bp, max_bp]` (or
    /// `[min_bp, max_bp)` when not inclusive).
    pub fn range(&self, min_bp: u64, max_bp: u64, inclusive: bool) -> Result<CscMatrix> {
        let upper = max_bp + inclusive as u64;
        let start = self.positions.partition_point(|&p| p < min_bp);
        let stop = self.positions.partition_point(|&p| p < upper);
        self.slice(
            &RowSelector::Slice {
                start: Some(start),
                stop: Some(stop),
                step: 1,
            },
            &ColSelector::All,
        )
    }

    fn apply_cols(&self, m: CscMatrix, cols: &ColSelector) -> Result<CscMatrix> {
        match cols {
            ColSelector::All => Ok(m),
            _ => {
                let keep = cols.resolve(m.cols())?;
                m.select_columns(&keep)
            }
        }
    }

    fn slice_rows(
        &self,
        start: Option<usize>,
        stop: Option<usize>,
        step: isize,
        cols: &ColSelector,
    ) -> Result<CscMatrix> {
        if step == 0 {
            return Err(PanelError::TypeMismatch("slice step must be nonzero".into()));
        }
        let n = self.n_variants();
        let cs = self.chunk_size();

        // Unbounded slice: walk every chunk in natural order.
        if start.unwrap_or(0) == 0 && stop.is_none() {
            let mut parts = Vec::with_capacity(self.spans.len());
            for span in &self.spans {
                let chunk = self.load_chunk(span.id)?;
                let idx = stepped(chunk.rows(), None, None, step)?;
                parts.push(chunk.to_csr().select_rows(&idx)?);
            }
            if parts.is_empty() {
                return self.apply_cols(CscMatrix::zeros(0, self.n_haps()), cols);
            }
            let refs: Vec<&CsrMatrix> = parts.iter().collect();
            return self.apply_cols(CsrMatrix::vstack(&refs)?.to_csc(), cols);
        }

        if n == 0 {
            return Err(PanelError::IndexOutOfRange("no variants to return".into()));
        }
        let start0 = start.unwrap_or(0);
        let stop1 = stop.unwrap_or(n).min(n);
        let first_chunk = start0 / cs;
        let last_chunk = stop1.saturating_sub(1) / cs;
        if first_chunk > last_chunk || first_chunk >= self.spans.len() {
            return Err(PanelError::IndexOutOfRange("no variants to return".into()));
        }

        if first_chunk == last_chunk {
            let chunk = self.load_chunk(first_chunk as u64)?;
            let local_stop = chunk_local_stop(stop1, cs).min(chunk.rows());
            let idx = stepped(chunk.rows(), Some(start0 % cs), Some(local_stop), step)?;
            let picked = chunk.to_csr().select_rows(&idx)?;
            return self.apply_cols(picked.to_csc(), cols);
        }

        // Multi-chunk walk: the chunk holding `start` clips its head, the
        // chunk holding `stop` clips its tail, interior chunks pass whole.
        // A negative step reverses the walk and each chunk's selection.
        let mut order: Vec<usize> = (first_chunk..=last_chunk).collect();
        if step < 0 {
            order.reverse();
        }
        let mut parts = Vec::with_capacity(order.len());
        for cid in order {
            let chunk = self.load_chunk(cid as u64)?;
            let (lo, hi) = if cid == first_chunk {
                (Some(start0 % cs), None)
            } else if cid == last_chunk {
                (None, Some(chunk_local_stop(stop1, cs).min(chunk.rows())))
            } else {
                (None, None)
            };
            let idx = stepped(chunk.rows(), lo, hi, step)?;
            parts.push(chunk.to_csr().select_rows(&idx)?);
        }
        let refs: Vec<&CsrMatrix> = parts.iter().collect();
        self.apply_cols(CsrMatrix::vstack(&refs)?.to_csc(), cols)
    }

    fn take_rows(&self, list: &[usize], cols: &ColSelector) -> Result<CscMatrix> {
        let n = self.n_variants();
        if let Some(&bad) = list.iter().find(|&&i| i >= n) {
            return Err(PanelError::IndexOutOfRange(format!(
                "index {bad} out of range for {n} variants"
            )));
        }
        if list.is_empty() {
            let keep = cols.resolve(self.n_haps())?;
            return Ok(CscMatrix::zeros(0, keep.len()));
        }
        let cs = self.chunk_size();

        // Group runs of indices by owning chunk, preserving caller order;
        // the cache keeps repeated visits to a chunk off the disk.
        let mut groups: Vec<(u64, Vec<usize>)> = Vec::new();
        for &idx in list {
            let chunk_id = (idx / cs) as u64;
            let local = idx % cs;
            if let Some((id, locals)) = groups.last_mut() {
                if *id == chunk_id {
                    locals.push(local);
                    continue;
                }
            }
            groups.push((chunk_id, vec![local]));
        }
        let mut parts = Vec::with_capacity(groups.len());
        for (chunk_id, locals) in &groups {
            let chunk = self.load_chunk(*chunk_id)?;
            parts.push(chunk.to_csr().select_rows(locals)?);
        }
        let refs: Vec<&CsrMatrix> = parts.iter().collect();
        self.apply_cols(CsrMatrix::vstack(&refs)?.to_csc(), cols)
    }

    /// Per-sample dosage for one chunk: adjacent haplotype columns summed
    /// pairwise into a dense `(rows, samples)` block.
    pub fn dosage_chunk(&self, chunk_id: u64) -> Result<DosageBlock> {
        let chunk = self.load_chunk(chunk_id)?;
        if chunk.cols() % 2 != 0 {
            return Err(PanelError::InvariantViolation(format!(
                "chunk {chunk_id} has an odd haplotype count {}",
                chunk.cols()
            )));
        }
        let samples = chunk.cols() / 2;
        let mut values = vec![0u8; chunk.rows() * samples];
        for s in 0..samples {
            for hap in [2 * s, 2 * s + 1] {
                for &r in chunk.column(hap) {
                    values[r as usize * samples + s] += 1;
                }
            }
        }
        Ok(DosageBlock {
            rows: chunk.rows(),
            samples,
            values,
        })
    }

    /// Minor-allele frequency per row of one chunk, folded into `[0, 0.5]`.
    pub fn maf_chunk(&self, chunk_id: u64) -> Result<Vec<f64>> {
        let n_haps = self.n_haps();
        if n_haps == 0 {
            return Err(PanelError::InvariantViolation(
                "archive holds no haplotypes".into(),
            ));
        }
        let chunk = self.load_chunk(chunk_id)?;
        Ok(chunk
            .row_counts()
            .iter()
            .map(|&count| {
                let freq = count as f64 / n_haps as f64;
                if freq > 0.5 { 1.0 - freq } else { freq }
            })
            .collect())
    }
}
