// Contig names from tab-delimited annotation files (GTF and friends)
use std::io::BufRead;
use std::path::{Path, PathBuf};
use fxhash::FxHashSet as HashSet;
use crate::config::defs::PipelineError;
use crate::utils::file::open_text_reader;


fn malformed(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::MalformedAnnotation {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Collects the distinct first-column values of a tab-delimited file.
///
/// Blank lines and `#` header lines are skipped. Single-column files are fine.
///
/// # Arguments
///
/// * `path` - Annotation file, plain or gzip compressed.
///
/// # Returns
/// Set of contig names.
pub fn contig_set(path: &Path) -> Result<HashSet<String>, PipelineError> {
    let reader = open_text_reader(path).map_err(|e| malformed(path, e.to_string()))?;
    let mut contigs = HashSet::default();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|e| malformed(path, e.to_string()))?;
        let line = std::str::from_utf8(&line)
            .map_err(|_| malformed(path, format!("line {} is not valid UTF-8 text", idx + 1)))?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let contig = line.split('\t').next().unwrap_or_default().trim();
        if contig.is_empty() {
            return Err(malformed(path, format!("line {} has an empty first column", idx + 1)));
        }
        if !contigs.contains(contig) {
            contigs.insert(contig.to_string());
        }
    }

    if contigs.is_empty() {
        return Err(malformed(path, "no contig names found"));
    }
    Ok(contigs)
}


/// Distinct contig names joined by single spaces, in set iteration order.
pub fn extract_contigs(path: &Path) -> Result<String, PipelineError> {
    let contigs = contig_set(path)?;
    Ok(contigs.into_iter().collect::<Vec<_>>().join(" "))
}


/// Runs [`extract_contigs`] on the blocking pool.
pub async fn extract_contigs_async(path: PathBuf) -> Result<String, PipelineError> {
    tokio::task::spawn_blocking(move || extract_contigs(&path))
        .await
        .map_err(|e| PipelineError::IOError(format!("Contig extraction task failed: {}", e)))?
}
