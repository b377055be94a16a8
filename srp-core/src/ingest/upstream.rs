use crate::error::{PanelError, Result};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Per-chromosome statistics reported by the upstream tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromStats {
    pub chromosome: String,
    /// `None` when the upstream index reports "." for the length.
    pub length: Option<u64>,
    pub n_variants: u64,
}

/// One variant row as dumped by the upstream tool (or a sites sidecar).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantRow {
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    pub id: String,
}

/// The seam to the external variant-file reader. Implementations answer
/// positional range queries over a single upstream file; the ingestion
/// pipeline is written against this trait only.
pub trait UpstreamTool: Send + Sync {
    /// The upstream file this tool reads.
    fn source(&self) -> &Path;

    fn stats(&self) -> Result<ChromStats>;

    /// The verbatim `##contig=<ID=…,…>` header line, if the file has one.
    fn contig_header(&self, chromosome: &str) -> Result<Option<String>>;

    /// Position of the first variant in the file.
    fn first_position(&self) -> Result<u64>;

    /// Variant rows in the inclusive positional range.
    fn variant_rows(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<VariantRow>>;

    /// Raw `|h0|h1|…` genotype lines for the inclusive positional range.
    fn genotype_text(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<u8>>;

    /// The upstream ID column for every variant in the file.
    fn all_ids(&self) -> Result<Vec<String>>;

    fn sample_ids(&self) -> Result<Vec<String>>;
}

/// Parse the stats dump: exactly one `chrom<TAB>length_or_dot<TAB>count` row.
pub fn parse_stats(stdout: &str) -> Result<ChromStats> {
    let mut rows = stdout.lines().filter(|l| !l.trim().is_empty());
    let row = rows
        .next()
        .ok_or_else(|| PanelError::Upstream("empty stats output".into()))?;
    if rows.next().is_some() {
        return Err(PanelError::InvariantViolation(
            "only one chromosome per file is supported".into(),
        ));
    }
    let fields: Vec<&str> = row.split('\t').collect();
    let [chromosome, length, count] = fields[..] else {
        return Err(PanelError::Upstream(format!("malformed stats row: {row:?}")));
    };
    let length = match length {
        "." => None,
        v => Some(v.parse().map_err(|_| {
            PanelError::Upstream(format!("unparseable chromosome length: {v:?}"))
        })?),
    };
    let n_variants = count
        .parse()
        .map_err(|_| PanelError::Upstream(format!("unparseable variant count: {count:?}")))?;
    Ok(ChromStats {
        chromosome: chromosome.to_string(),
        length,
        n_variants,
    })
}

/// Parse one `chrom<TAB>pos<TAB>ref<TAB>alt<TAB>id` row.
pub fn parse_variant_row(line: &str) -> Result<VariantRow> {
    let fields: Vec<&str> = line.trim_end().split('\t').collect();
    let [chromosome, pos, reference, alternate, id] = fields[..] else {
        return Err(PanelError::Upstream(format!(
            "malformed variant row: {line:?}"
        )));
    };
    Ok(VariantRow {
        chromosome: chromosome.to_string(),
        position: pos
            .parse()
            .map_err(|_| PanelError::Upstream(format!("unparseable position: {pos:?}")))?,
        reference: reference.to_string(),
        alternate: alternate.to_string(),
        id: id.to_string(),
    })
}

/// Parse one `|h0|h1|…` genotype line into haplotype bits.
pub fn parse_genotype_line(line: &str) -> Result<Vec<bool>> {
    let rest = line.strip_prefix('|').ok_or_else(|| {
        PanelError::Upstream(format!("genotype line missing leading '|': {line:?}"))
    })?;
    rest.split('|')
        .map(|tok| match tok {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(PanelError::Upstream(format!(
                "unparseable haplotype call: {other:?}"
            ))),
        })
        .collect()
}

/// Append a suffix to a path's file name (`a.bcf` + `.tbi` -> `a.bcf.tbi`).
pub fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn command_failure(program: &str, args: &[String], stderr: &[u8]) -> PanelError {
    PanelError::Upstream(format!(
        "`{program} {}` failed: {}",
        args.join(" "),
        String::from_utf8_lossy(stderr).trim()
    ))
}

fn run(program: &str, args: &[String]) -> Result<Vec<u8>> {
    debug!(program, ?args, "running upstream command");
    let out = Command::new(program).args(args).output()?;
    if !out.status.success() {
        return Err(command_failure(program, args, &out.stderr));
    }
    Ok(out.stdout)
}

fn run_shell(cmd: &str) -> Result<Vec<u8>> {
    debug!(cmd, "running upstream pipeline");
    let out = Command::new("sh").args(["-c", cmd]).output()?;
    if !out.status.success() {
        return Err(PanelError::Upstream(format!(
            "`{cmd}` failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out.stdout)
}

fn stdout_lines(bytes: Vec<u8>) -> Vec<String> {
    String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

/// `bcftools`-backed implementation of the upstream contract.
pub struct BcfTool {
    path: PathBuf,
    program: String,
}

impl BcfTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            program: "bcftools".to_string(),
        }
    }

    fn path_arg(&self) -> String {
        self.path.display().to_string()
    }

    /// Build the positional index if the file has neither `.tbi` nor `.csi`.
    pub fn ensure_index(&self, threads: usize) -> Result<()> {
        if add_suffix(&self.path, ".tbi").exists() || add_suffix(&self.path, ".csi").exists() {
            return Ok(());
        }
        debug!(path = %self.path.display(), "indexing upstream file");
        run(
            &self.program,
            &[
                "index".to_string(),
                self.path_arg(),
                "--threads".to_string(),
                threads.to_string(),
            ],
        )
        .map(drop)
    }
}

impl UpstreamTool for BcfTool {
    fn source(&self) -> &Path {
        &self.path
    }

    fn stats(&self) -> Result<ChromStats> {
        let out = run(
            &self.program,
            &["index".to_string(), "--stats".to_string(), self.path_arg()],
        )?;
        parse_stats(&String::from_utf8_lossy(&out))
    }

    fn contig_header(&self, chromosome: &str) -> Result<Option<String>> {
        let out = run(
            &self.program,
            &["view".to_string(), "-h".to_string(), self.path_arg()],
        )?;
        let wanted = format!("##contig=<ID={chromosome},");
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .find(|l| l.starts_with(&wanted))
            .map(str::to_string))
    }

    fn first_position(&self) -> Result<u64> {
        // Stream positions and stop after the first line.
        let mut child = Command::new(&self.program)
            .args(["query", "-f", "%POS\n"])
            .arg(&self.path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PanelError::Upstream("no stdout from upstream query".into()))?;
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line)?;
        let _ = child.kill();
        let _ = child.wait();
        line.trim()
            .parse()
            .map_err(|_| PanelError::Upstream(format!("unparseable first position: {line:?}")))
    }

    fn variant_rows(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<VariantRow>> {
        let out = run(
            &self.program,
            &[
                "query".to_string(),
                "-r".to_string(),
                format!("{chromosome}:{start}-{end}"),
                "-f".to_string(),
                "%CHROM\t%POS\t%REF\t%ALT\t%ID\n".to_string(),
                self.path_arg(),
            ],
        )?;
        String::from_utf8_lossy(&out)
            .lines()
            .filter(|l| !l.is_empty())
            .map(parse_variant_row)
            .collect()
    }

    fn genotype_text(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        // -r includes overlapping indels but is faster than -t, so use both.
        run_shell(&format!(
            "{prog} view -r {chromosome}:{start}-{end} \"{path}\" | \
             {prog} query -t {chromosome}:{start}-{end} -f '[|%GT]\\n'",
            prog = self.program,
            path = self.path.display(),
        ))
    }

    fn all_ids(&self) -> Result<Vec<String>> {
        run(
            &self.program,
            &[
                "query".to_string(),
                "-f".to_string(),
                "%ID\n".to_string(),
                self.path_arg(),
            ],
        )
        .map(stdout_lines)
    }

    fn sample_ids(&self) -> Result<Vec<String>> {
        run(
            &self.program,
            &["query".to_string(), "-l".to_string(), self.path_arg()],
        )
        .map(stdout_lines)
    }
}

/// `xsqueezeit`-backed implementation. Metadata queries go through the
/// `<base>_var.bcf` sidecar; only the genotype dump decompresses the xsi
/// payload itself.
pub struct XsiTool {
    xsi: PathBuf,
    var_bcf: BcfTool,
}

impl XsiTool {
    pub fn new(xsi_path: impl Into<PathBuf>) -> Result<Self> {
        let xsi: PathBuf = xsi_path.into();
        let var_path = add_suffix(&xsi, "_var.bcf");
        if !var_path.exists() {
            return Err(PanelError::FileNotFound(var_path));
        }
        Ok(Self {
            var_bcf: BcfTool::new(var_path),
            xsi,
        })
    }
}

impl UpstreamTool for XsiTool {
    fn source(&self) -> &Path {
        &self.xsi
    }

    fn stats(&self) -> Result<ChromStats> {
        self.var_bcf.stats()
    }

    fn contig_header(&self, chromosome: &str) -> Result<Option<String>> {
        self.var_bcf.contig_header(chromosome)
    }

    fn first_position(&self) -> Result<u64> {
        self.var_bcf.first_position()
    }

    fn variant_rows(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<VariantRow>> {
        self.var_bcf.variant_rows(chromosome, start, end)
    }

    fn genotype_text(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        run_shell(&format!(
            "xsqueezeit -x -f \"{xsi}\" -p -r \"{chromosome}:{start}-{end}\" | \
             bcftools query -t {chromosome}:{start}-{end} -f '[|%GT]\\n'",
            xsi = self.xsi.display(),
        ))
    }

    fn all_ids(&self) -> Result<Vec<String>> {
        self.var_bcf.all_ids()
    }

    fn sample_ids(&self) -> Result<Vec<String>> {
        self.var_bcf.sample_ids()
    }
}
