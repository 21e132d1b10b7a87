/// Functions and structs for working with creating command-line arguments

use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use crate::config::defs::{ARRIBA_TAG, TOOL_VERSIONS};


/// A fully built external tool call. Only readable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    tool: String,
    program: String,
    args: Vec<String>,
    log_path: PathBuf,
    workdir: PathBuf,
}

impl ToolInvocation {
    pub fn new(tool: &str, program: &str, args: Vec<String>, log_path: PathBuf, workdir: PathBuf) -> Self {
        Self {
            tool: tool.to_string(),
            program: program.to_string(),
            args,
            log_path,
            workdir,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Shell-like rendering for logs. Not meant to be executed.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}


pub mod arriba {
    use std::path::{Path, PathBuf};
    use anyhow::anyhow;
    use tokio::process::Command;
    use crate::config::defs::{
        ToolVariant, ARRIBA_ANNOTATION_FLAG, ARRIBA_CONTIGS_FLAG, ARRIBA_DISCARDED_FLAG,
        ARRIBA_FILTERS_FLAG, ARRIBA_KNOWN_FUSIONS_FLAG, ARRIBA_LOG, ARRIBA_OUTPUT_FLAG,
        ARRIBA_READS_FLAG, ARRIBA_TAG, DISCARDED_FUSIONS_TSV, FUSIONS_TSV,
    };
    use crate::utils::command::ToolInvocation;
    use crate::utils::file::file_path_manipulator;
    use crate::utils::streams::{read_child_output_to_vec, ChildStream};

    /// Output paths agreed upon before the tool runs.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PlannedOutputs {
        pub fusions: PathBuf,
        pub discarded_fusions: PathBuf,
        pub log: PathBuf,
        pub intergenic_fusions: Option<PathBuf>,
    }

    impl PlannedOutputs {
        /// Default names in `workdir`, optionally prefixed with a sample name.
        pub fn defaults(workdir: &Path, sample: Option<&str>) -> Self {
            Self::named(workdir, sample, FUSIONS_TSV, DISCARDED_FUSIONS_TSV, None)
        }

        pub fn named(
            workdir: &Path,
            sample: Option<&str>,
            fusions: &str,
            discarded_fusions: &str,
            intergenic_fusions: Option<&str>,
        ) -> Self {
            Self {
                fusions: file_path_manipulator(workdir, sample, fusions, "_"),
                discarded_fusions: file_path_manipulator(workdir, sample, discarded_fusions, "_"),
                log: file_path_manipulator(workdir, sample, ARRIBA_LOG, "_"),
                intergenic_fusions: intergenic_fusions
                    .map(|name| file_path_manipulator(workdir, sample, name, "_")),
            }
        }
    }

    /// Resolved inputs of one fusion calling run.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ArribaConfig {
        pub program: String,
        pub variant: ToolVariant,
        pub reads: PathBuf,
        pub annotation: PathBuf,
        pub genome: Option<PathBuf>,
        pub blacklist: Option<PathBuf>,
        pub known_fusions: Option<PathBuf>,
        /// Space-joined contig allow-list, already derived from the annotation.
        pub contigs: Option<String>,
        pub outputs: PlannedOutputs,
        pub workdir: PathBuf,
    }

    pub async fn arriba_presence_check(program: &str) -> anyhow::Result<String> {
        let args: Vec<&str> = vec!["-h"];

        let mut child = Command::new(program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}. Is arriba installed?", program, e))?;

        let lines = read_child_output_to_vec(&mut child, ChildStream::Combined).await?;
        child.wait().await?;

        let version_line = lines
            .iter()
            .find(|line| line.trim_start().starts_with("Version:"))
            .ok_or_else(|| anyhow!("No version line in {} -h output", program))?;
        let version = version_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("Invalid arriba -h output: {}", version_line))?
            .to_string();
        if version.is_empty() {
            return Err(anyhow!("Empty version number in arriba -h output: {}", version_line));
        }
        Ok(version)
    }

    fn push_path(args_vec: &mut Vec<String>, flag: &str, path: &Path) {
        args_vec.push(flag.to_string());
        args_vec.push(path.to_string_lossy().to_string());
    }

    pub fn arg_generator(config: &ArribaConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        let variant = config.variant;

        push_path(&mut args_vec, ARRIBA_READS_FLAG, &config.reads);
        push_path(&mut args_vec, ARRIBA_OUTPUT_FLAG, &config.outputs.fusions);
        push_path(&mut args_vec, ARRIBA_DISCARDED_FLAG, &config.outputs.discarded_fusions);
        push_path(&mut args_vec, ARRIBA_ANNOTATION_FLAG, &config.annotation);

        if let (Some(genome), Some(flag)) = (&config.genome, variant.genome_flag()) {
            push_path(&mut args_vec, flag, genome);
            if let Some(contigs) = config.contigs.as_ref().filter(|_| variant.supports_contig_list()) {
                args_vec.push(ARRIBA_CONTIGS_FLAG.to_string());
                args_vec.push(contigs.clone());
            }
        }

        match (&config.blacklist, variant.default_blacklist_filter()) {
            (Some(blacklist), _) => push_path(&mut args_vec, variant.blacklist_flag(), blacklist),
            (None, Some(filter)) => {
                args_vec.push(ARRIBA_FILTERS_FLAG.to_string());
                args_vec.push(filter.to_string());
            }
            (None, None) => {}
        }

        if let Some(known_fusions) = &config.known_fusions {
            push_path(&mut args_vec, ARRIBA_KNOWN_FUSIONS_FLAG, known_fusions);
        }

        args_vec
    }

    pub fn build_invocation(config: &ArribaConfig) -> ToolInvocation {
        ToolInvocation::new(
            ARRIBA_TAG,
            &config.program,
            arg_generator(config),
            config.outputs.log.clone(),
            config.workdir.clone(),
        )
    }

}


/// Parses "major.minor[.patch]" into a comparable float, as used in TOOL_VERSIONS.
pub fn version_as_f32(version: &str) -> Option<f32> {
    let trimmed = version.trim_start_matches('v');
    let mut parts = trimmed.split('.');
    let major = parts.next()?;
    let minor = parts.next().unwrap_or("0");
    format!("{}.{}", major, minor).parse::<f32>().ok()
}


/// Runs the tool's presence check and compares against the known-good version.
pub async fn check_version(tool: &str, program: &str) -> Result<String> {
    let version = match tool {
        ARRIBA_TAG => arriba::arriba_presence_check(program).await?,
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };

    if let (Some(found), Some(min)) = (version_as_f32(&version), TOOL_VERSIONS.get(tool)) {
        if found < *min {
            log::warn!("{} version {} is older than the tested {}", tool, version, min);
        }
    }
    Ok(version)
}
