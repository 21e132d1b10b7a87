// src/utils/artifacts.rs: Upstream artifacts and their physical files

use std::path::{Path, PathBuf};
use std::str::FromStr;
use crate::config::defs::PipelineError;

/// Where the aligner put the chimeric alignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChimOutType {
    /// Chimeric records live inside the main alignment BAM.
    WithinContainer,
    /// Chimeric records were written to a separate SAM file.
    SeparateLegacy,
}

impl FromStr for ChimOutType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "within-container" | "withinbam" => Ok(ChimOutType::WithinContainer),
            "separate-legacy" | "samseparateold" => Ok(ChimOutType::SeparateLegacy),
            _ => Err(PipelineError::InvalidMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for ChimOutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChimOutType::WithinContainer => write!(f, "within-container"),
            ChimOutType::SeparateLegacy => write!(f, "separate-legacy"),
        }
    }
}


/// Output of an aligner run: the main BAM and, for the legacy chimeric
/// output mode, the separate chimeric SAM.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedReadsArtifact {
    pub bam: PathBuf,
    pub chimeric: Option<PathBuf>,
}

/// Tab-delimited annotation with contig names in the first column.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationArtifact {
    pub path: PathBuf,
}

/// Single-file artifact passed to the tool verbatim (genome, gene lists).
#[derive(Debug, Clone, PartialEq)]
pub struct FileArtifact {
    pub path: PathBuf,
}

impl FileArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnnotationArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}


/// Selects the physical file holding chimeric alignments for a mode.
///
/// # Arguments
///
/// * `reads` - Aligned reads artifact.
/// * `mode` - Chimeric output mode selector, as configured by the caller.
///
/// # Returns
/// Path handed to the tool's reads flag.
pub fn resolve_reads(reads: &AlignedReadsArtifact, mode: &str) -> Result<PathBuf, PipelineError> {
    let mode: ChimOutType = mode.parse()?;
    match mode {
        ChimOutType::WithinContainer => Ok(reads.bam.clone()),
        ChimOutType::SeparateLegacy => reads
            .chimeric
            .clone()
            .ok_or_else(|| PipelineError::MissingArtifact {
                name: "chimeric".to_string(),
                path: reads.bam.with_extension("chimeric.sam"),
            }),
    }
}
