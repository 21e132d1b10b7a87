use std::path::PathBuf;
use std::time::Duration;
use std::collections::HashMap;
use clap::ValueEnum;
use lazy_static::lazy_static;
use log::LevelFilter;
use thiserror::Error;
use crate::cli::Arguments;

// External software
pub const ARRIBA_TAG: &str = "arriba";

lazy_static! {
    /// Oldest tool release known to accept the full flag set used here.
    pub static ref TOOL_VERSIONS: HashMap<&'static str, f32> = {
        let mut m = HashMap::new();
        m.insert(ARRIBA_TAG, 2.4);

        m
    };
}

// Arriba flags
pub const ARRIBA_READS_FLAG: &str = "-x";
pub const ARRIBA_OUTPUT_FLAG: &str = "-o";
pub const ARRIBA_DISCARDED_FLAG: &str = "-O";
pub const ARRIBA_ANNOTATION_FLAG: &str = "-a";
pub const ARRIBA_GENOME_FLAG: &str = "-g";
pub const ARRIBA_BLACKLIST_FLAG: &str = "-b";
pub const ARRIBA_KNOWN_FUSIONS_FLAG: &str = "-k";
pub const ARRIBA_CONTIGS_FLAG: &str = "-i";
pub const ARRIBA_FILTERS_FLAG: &str = "-f";
pub const ARRIBA_BLACKLIST_FILTER: &str = "blacklist";

// Static Filenames
pub const FUSIONS_TSV: &str = "fusions.tsv";
pub const DISCARDED_FUSIONS_TSV: &str = "discarded_fusions.tsv";
pub const ARRIBA_LOG: &str = "arriba.log";

// Output artifact names
pub const FUSIONS_OUTPUT: &str = "fusions";
pub const DISCARDED_FUSIONS_OUTPUT: &str = "discarded_fusions";
pub const INTERGENIC_FUSIONS_OUTPUT: &str = "intergenic_fusions";
pub const LOG_OUTPUT: &str = "log";

// Progress milestones
pub const PROGRESS_STARTED: f32 = 0.1;
pub const PROGRESS_DONE: f32 = 1.0;

// Static Parameters
pub const LOG_CHANNEL_CAPACITY: usize = 1024;
pub const LOG_DRAIN_GRACE: Duration = Duration::from_secs(5);


/// Argument layout of the fusion caller. The two known configurations
/// disagree on what `-g` means and on whether an intergenic fusions file is
/// part of the declared outputs, so every difference is answered here rather
/// than in the command builder.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ToolVariant {
    /// `-g` is the genome, `-b` the blacklist, `-f blacklist` when none is given.
    #[default]
    GenomeAware,
    /// `-g` carries the blacklist gene list; no genome or contig list is passed.
    BlacklistAsGenome,
}

impl ToolVariant {
    pub fn genome_flag(&self) -> Option<&'static str> {
        match self {
            ToolVariant::GenomeAware => Some(ARRIBA_GENOME_FLAG),
            ToolVariant::BlacklistAsGenome => None,
        }
    }

    pub fn blacklist_flag(&self) -> &'static str {
        match self {
            ToolVariant::GenomeAware => ARRIBA_BLACKLIST_FLAG,
            ToolVariant::BlacklistAsGenome => ARRIBA_GENOME_FLAG,
        }
    }

    /// Filter selector passed instead of a blacklist path when no blacklist is given.
    pub fn default_blacklist_filter(&self) -> Option<&'static str> {
        match self {
            ToolVariant::GenomeAware => Some(ARRIBA_BLACKLIST_FILTER),
            ToolVariant::BlacklistAsGenome => None,
        }
    }

    pub fn supports_contig_list(&self) -> bool {
        matches!(self, ToolVariant::GenomeAware)
    }

    pub fn declares_intergenic_output(&self) -> bool {
        matches!(self, ToolVariant::BlacklistAsGenome)
    }
}

impl std::fmt::Display for ToolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolVariant::GenomeAware => write!(f, "genome-aware"),
            ToolVariant::BlacklistAsGenome => write!(f, "blacklist-as-genome"),
        }
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid chimeric output type: {0}")]
    InvalidMode(String),

    #[error("Missing {name} artifact: {path}")]
    MissingArtifact { name: String, path: PathBuf },

    #[error("Malformed annotation {path}: {reason}")]
    MalformedAnnotation { path: PathBuf, reason: String },

    #[error("Configuration gap: {0}")]
    ConfigurationGap(String),

    #[error("Failed to spawn {tool}: {error}")]
    Spawn { tool: String, error: String },

    #[error("{tool} failed with exit code {exit_code}, see log {}", .log.display())]
    ToolExecution { tool: String, exit_code: i32, log: PathBuf },

    #[error("{tool} timed out after {after:?}, partial log {}", .log.display())]
    TimedOut { tool: String, after: Duration, log: PathBuf },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub args: Arguments,
    pub log_level: LevelFilter,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_flag_layout() {
        assert_eq!(ToolVariant::GenomeAware.genome_flag(), Some("-g"));
        assert_eq!(ToolVariant::GenomeAware.blacklist_flag(), "-b");
        assert_eq!(ToolVariant::BlacklistAsGenome.genome_flag(), None);
        assert_eq!(ToolVariant::BlacklistAsGenome.blacklist_flag(), "-g");
        assert_eq!(ToolVariant::GenomeAware.default_blacklist_filter(), Some("blacklist"));
        assert_eq!(ToolVariant::BlacklistAsGenome.default_blacklist_filter(), None);
        assert!(ToolVariant::BlacklistAsGenome.declares_intergenic_output());
        assert!(!ToolVariant::GenomeAware.declares_intergenic_output());
    }

    #[test]
    fn test_tool_execution_message_carries_log() {
        let err = PipelineError::ToolExecution {
            tool: ARRIBA_TAG.to_string(),
            exit_code: 137,
            log: PathBuf::from("/tmp/run/arriba.log"),
        };
        assert_eq!(
            err.to_string(),
            "arriba failed with exit code 137, see log /tmp/run/arriba.log"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: PipelineError = std::io::Error::other("disk full").into();
        assert_eq!(err.to_string(), "IO error: disk full");
    }
}
