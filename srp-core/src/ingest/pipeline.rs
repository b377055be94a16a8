use crate::codec;
use crate::container::archive::{self, ArchiveContents};
use crate::container::chunktab::{self, ChunkSpan};
use crate::container::metadata::{Metadata, timestamp};
use crate::container::variants::{self, Variant};
use crate::error::{PanelError, Result};
use crate::ingest::plan;
use crate::ingest::upstream::{UpstreamTool, VariantRow, parse_genotype_line};
use crate::sparse::csc::CscMatrix;
use crate::store::chunks::encode_chunk;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Variant rows per chunk.
    pub chunk_size: u64,
    /// Upstream-tool invocations run in parallel.
    pub threads: usize,
    /// When false, converting into a non-empty archive is a no-op.
    pub replace_file: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::container::metadata::DEFAULT_CHUNK_SIZE,
            threads: 1,
            replace_file: false,
        }
    }
}

/// Convert an upstream variant file into the archive at `archive_path`.
///
/// The archive file is only touched by the final rewrite; any failure
/// before that leaves it as it was and discards the staging directory.
pub fn convert(
    archive_path: &Path,
    tool: &dyn UpstreamTool,
    opts: &ConvertOptions,
    mut meta: Metadata,
) -> Result<()> {
    if opts.chunk_size == 0 {
        return Err(PanelError::TypeMismatch("chunk_size must be nonzero".into()));
    }
    let source = tool.source();
    meta.source_file = source.display().to_string();
    meta.chunk_size = opts.chunk_size;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.threads)
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let (rows, sample_ids, sidecar_ids) = if use_sidecars(source) {
        info!(source = %source.display(), "ingesting variants from sidecar files");
        let sample_ids = read_lines(&source.with_extension("samples"))?;
        let rows = read_sites(&source.with_extension("sites"))?;
        let ids = tool.all_ids()?;
        (rows, sample_ids, Some(ids))
    } else {
        let stats = tool.stats()?;
        if stats.n_variants == 0 {
            return Err(PanelError::InvariantViolation(
                "upstream file contains no variants".into(),
            ));
        }
        let chr_length = stats.length.unwrap_or(plan::MAX_CHROM_LENGTH);
        let first = tool.first_position()?;
        let ranges = plan::chunk_ranges(first, chr_length, stats.n_variants, opts.chunk_size);
        if ranges.is_empty() {
            return Err(PanelError::InvariantViolation(
                "no variant ranges could be planned".into(),
            ));
        }
        info!(ranges = ranges.len(), threads = opts.threads, "ingesting variants");
        let fetched: Vec<Vec<VariantRow>> = pool.install(|| {
            ranges
                .par_iter()
                .map(|&(start, end)| tool.variant_rows(&stats.chromosome, start, end))
                .collect::<Result<_>>()
        })?;
        let rows = dedup(fetched.into_iter().flatten());
        (rows, tool.sample_ids()?, None)
    };

    if rows.is_empty() {
        return Err(PanelError::InvariantViolation(
            "no variants were ingested".into(),
        ));
    }
    let chromosome = rows[0].chromosome.clone();
    if rows.iter().any(|r| r.chromosome != chromosome) {
        return Err(PanelError::InvariantViolation(
            "only one chromosome per file is supported".into(),
        ));
    }

    meta.contig_field = tool
        .contig_header(&chromosome)?
        .unwrap_or_else(|| format!("##contig=<ID={chromosome}>"));

    // The human-readable ids keep the literal alleles; the table rows only
    // keep their digests.
    let original_ids = match sidecar_ids {
        Some(ids) => {
            if ids.len() != rows.len() {
                return Err(PanelError::InvariantViolation(format!(
                    "{} upstream IDs for {} variants",
                    ids.len(),
                    rows.len()
                )));
            }
            ids
        }
        None => rows.iter().map(|r| r.id.clone()).collect(),
    };
    let ids: Vec<String> = rows
        .iter()
        .map(|r| {
            format!(
                "{}-{}-{}-{}",
                r.chromosome, r.position, r.reference, r.alternate
            )
        })
        .collect();
    let table: Vec<Variant> = rows
        .iter()
        .map(|r| Variant {
            chromosome: r.chromosome.clone(),
            position: r.position,
            ref_hash: variants::hash_allele(&r.reference),
            alt_hash: variants::hash_allele(&r.alternate),
        })
        .collect();

    let spans: Vec<ChunkSpan> = table
        .chunks(opts.chunk_size as usize)
        .enumerate()
        .map(|(i, block)| ChunkSpan {
            id: i as u64,
            first_pos: block[0].position,
            last_pos: block[block.len() - 1].position,
        })
        .collect();

    meta.chromosome = chromosome.clone();
    meta.n_variants = table.len() as u64;
    meta.min_position = table[0].position;
    meta.max_position = table[table.len() - 1].position;
    meta.n_chunks = spans.len() as u64;
    meta.n_samples = sample_ids.len() as u64;
    meta.variant_dtypes = variants::schema_for(&chromosome);

    // Haplotype ingest: one staged blob per chunk, in parallel.
    let staging = TempDir::new()?;
    let positions: Vec<u64> = table.iter().map(|v| v.position).collect();
    info!(chunks = spans.len(), "ingesting haplotypes");
    let widths: Vec<u64> = pool.install(|| {
        spans
            .par_iter()
            .map(|span| {
                ingest_chunk(
                    tool,
                    &chromosome,
                    span,
                    &spans,
                    &positions,
                    opts.chunk_size,
                    staging.path(),
                )
            })
            .collect::<Result<_>>()
    })?;

    let n_haps = widths[0];
    if widths.iter().any(|&w| w != n_haps) {
        return Err(PanelError::InvariantViolation(
            "haplotype column count differs across chunks".into(),
        ));
    }
    meta.n_haps = n_haps;
    meta.updated_at = timestamp();

    let table_bytes = variants::encode_table(&table, &meta.variant_dtypes)?;
    let chunk_bytes = chunktab::write_table(&spans);
    archive::write_archive(
        archive_path,
        &ArchiveContents {
            metadata: &meta,
            variants: &table_bytes,
            ids: &ids,
            original_ids: &original_ids,
            chunks: &chunk_bytes,
            sample_ids: &sample_ids,
        },
        staging.path(),
    )?;
    info!(
        n_variants = meta.n_variants,
        n_haps = meta.n_haps,
        n_chunks = meta.n_chunks,
        "archive written"
    );
    Ok(())
}

/// Fetch, parse, trim, and stage one chunk; returns its column count.
fn ingest_chunk(
    tool: &dyn UpstreamTool,
    chromosome: &str,
    span: &ChunkSpan,
    spans: &[ChunkSpan],
    positions: &[u64],
    chunk_size: u64,
    staging: &Path,
) -> Result<u64> {
    let text = tool.genotype_text(chromosome, span.first_pos, span.last_pos)?;
    if text.is_empty() {
        return Err(PanelError::Upstream(format!(
            "no genotypes returned for {chromosome}:{}-{}",
            span.first_pos, span.last_pos
        )));
    }
    let text = std::str::from_utf8(&text)
        .map_err(|_| PanelError::Upstream("genotype stream is not UTF-8".into()))?;
    let mut bits = Vec::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        bits.push(parse_genotype_line(line)?);
    }

    // The range query is positional, so a position sitting exactly on the
    // boundary between two chunks shows up in both streams; drop the rows
    // that belong to the previous chunk.
    let offset = boundary_offset(span, spans, positions, chunk_size);
    let end = (offset + chunk_size as usize).min(bits.len());
    let window = &bits[offset.min(bits.len())..end];

    let expected = expected_rows(span.id, spans.len() as u64, positions.len() as u64, chunk_size);
    if window.len() != expected {
        return Err(PanelError::InvariantViolation(format!(
            "chunk {}: parsed {} rows, expected {expected}",
            span.id,
            window.len()
        )));
    }
    let matrix = CscMatrix::from_rows(window)?;
    debug!(chunk = span.id, rows = matrix.rows(), nnz = matrix.nnz(), "staging chunk");
    let blob = codec::compress(&encode_chunk(&matrix), codec::LEVEL)?;
    fs::write(staging.join(span.id.to_string()), blob)?;
    Ok(matrix.cols() as u64)
}

/// Rows this chunk must hold: `chunk_size`, or the remainder for the last.
fn expected_rows(chunk_id: u64, n_chunks: u64, n_variants: u64, chunk_size: u64) -> usize {
    if chunk_id + 1 == n_chunks {
        ((n_variants - 1) % chunk_size + 1) as usize
    } else {
        chunk_size as usize
    }
}

/// How many leading rows of this chunk's genotype stream belong to the
/// previous chunk because they share its boundary position. Always 0 for
/// chunk 0.
fn boundary_offset(
    span: &ChunkSpan,
    spans: &[ChunkSpan],
    positions: &[u64],
    chunk_size: u64,
) -> usize {
    if span.id == 0 || spans[span.id as usize - 1].last_pos != span.first_pos {
        return 0;
    }
    let first_row = (span.id * chunk_size) as usize;
    positions[..first_row]
        .iter()
        .rev()
        .take_while(|&&p| p == span.first_pos)
        .count()
}

fn use_sidecars(source: &Path) -> bool {
    // Plain VCFs keep the full query path even when stale sidecars exist.
    let is_vcf = source
        .file_name()
        .map(|n| n.to_string_lossy().contains(".vcf"))
        .unwrap_or(false);
    !is_vcf
        && source.with_extension("sites").exists()
        && source.with_extension("samples").exists()
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}

/// Read a `.sites` sidecar: tab-separated `chrom pos ref alt [id]` rows.
fn read_sites(path: &Path) -> Result<Vec<VariantRow>> {
    fs::read_to_string(path)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.trim_end().split('\t').collect();
            let (chromosome, pos, reference, alternate, id) = match fields[..] {
                [c, p, r, a] => (c, p, r, a, ""),
                [c, p, r, a, i] => (c, p, r, a, i),
                _ => {
                    return Err(PanelError::Upstream(format!(
                        "malformed sites row: {line:?}"
                    )));
                }
            };
            Ok(VariantRow {
                chromosome: chromosome.to_string(),
                position: pos.parse().map_err(|_| {
                    PanelError::Upstream(format!("unparseable position: {pos:?}"))
                })?,
                reference: reference.to_string(),
                alternate: alternate.to_string(),
                id: id.to_string(),
            })
        })
        .collect()
}

/// Drop repeated rows, keeping the first occurrence in stream order.
fn dedup(rows: impl Iterator<Item = VariantRow>) -> Vec<VariantRow> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        if seen.insert(row.clone()) {
            out.push(row);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pos: u64, alt: &str) -> VariantRow {
        VariantRow {
            chromosome: "chr1".into(),
            position: pos,
            reference: "A".into(),
            alternate: alt.into(),
            id: ".".into(),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let rows = dedup(
            vec![row(1, "T"), row(2, "G"), row(1, "T"), row(2, "C")].into_iter(),
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], row(1, "T"));
        assert_eq!(rows[2], row(2, "C"));
    }

    #[test]
    fn last_chunk_row_counts() {
        assert_eq!(expected_rows(0, 2, 3, 2), 2);
        assert_eq!(expected_rows(1, 2, 3, 2), 1);
        // evenly divisible: the last chunk is full-sized
        assert_eq!(expected_rows(1, 2, 4, 2), 2);
    }

    #[test]
    fn boundary_offset_counts_shared_positions() {
        let positions = [100, 200, 200, 300];
        let spans = [
            ChunkSpan { id: 0, first_pos: 100, last_pos: 200 },
            ChunkSpan { id: 1, first_pos: 200, last_pos: 300 },
        ];
        assert_eq!(boundary_offset(&spans[0], &spans, &positions, 2), 0);
        assert_eq!(boundary_offset(&spans[1], &spans, &positions, 2), 1);
    }

    #[test]
    fn boundary_offset_without_duplicate() {
        let positions = [100, 150, 200, 300];
        let spans = [
            ChunkSpan { id: 0, first_pos: 100, last_pos: 150 },
            ChunkSpan { id: 1, first_pos: 200, last_pos: 300 },
        ];
        assert_eq!(boundary_offset(&spans[1], &spans, &positions, 2), 0);
    }
}
