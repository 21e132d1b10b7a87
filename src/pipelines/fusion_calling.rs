use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info, warn};
use serde::Serialize;
use crate::config::defs::{
    PipelineError, RunConfig, ToolVariant, ARRIBA_TAG, DISCARDED_FUSIONS_OUTPUT,
    DISCARDED_FUSIONS_TSV, FUSIONS_OUTPUT, FUSIONS_TSV, INTERGENIC_FUSIONS_OUTPUT, LOG_OUTPUT,
    PROGRESS_DONE, PROGRESS_STARTED,
};
use crate::utils::annotation::extract_contigs_async;
use crate::utils::artifacts::{resolve_reads, AlignedReadsArtifact, AnnotationArtifact, FileArtifact};
use crate::utils::command::arriba::{build_invocation, ArribaConfig, PlannedOutputs};
use crate::utils::command::check_version;
use crate::utils::file::{absolutize, validate_file_inputs};
use crate::utils::progress::{LogProgress, Progress};
use crate::utils::streams::{run_logged, ToolOutcome};


/// Upstream artifacts of one fusion calling run.
#[derive(Debug, Clone)]
pub struct FusionInputs {
    pub reads: AlignedReadsArtifact,
    /// Chimeric output mode selector, parsed during resolution.
    pub chim_out_type: String,
    pub annotation: AnnotationArtifact,
    pub genome: Option<FileArtifact>,
    pub blacklist: Option<FileArtifact>,
    pub known_fusions: Option<FileArtifact>,
}

#[derive(Debug, Clone)]
pub struct FusionSettings {
    pub program: String,
    pub variant: ToolVariant,
    pub derive_contigs: bool,
    pub workdir: PathBuf,
    pub sample: Option<String>,
    pub output_file: String,
    pub discarded_fusions_file: String,
    pub intergenic_fusions_file: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            program: ARRIBA_TAG.to_string(),
            variant: ToolVariant::default(),
            derive_contigs: true,
            workdir: PathBuf::from("."),
            sample: None,
            output_file: FUSIONS_TSV.to_string(),
            discarded_fusions_file: DISCARDED_FUSIONS_TSV.to_string(),
            intergenic_fusions_file: None,
            timeout: None,
        }
    }
}

impl FusionSettings {
    /// Output paths under `workdir`, which the caller has already made absolute.
    pub fn planned_outputs(&self, workdir: &Path) -> PlannedOutputs {
        PlannedOutputs::named(
            workdir,
            self.sample.as_deref(),
            &self.output_file,
            &self.discarded_fusions_file,
            self.intergenic_fusions_file
                .as_deref()
                .filter(|_| self.variant.declares_intergenic_output()),
        )
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Resolving,
    Building,
    Running,
    Succeeded,
    Failed,
}

/// Files declared as produced by a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputArtifactSet {
    pub fusions: PathBuf,
    pub discarded_fusions: PathBuf,
    pub log: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intergenic_fusions: Option<PathBuf>,
}

impl OutputArtifactSet {
    pub fn named(&self) -> Vec<(&'static str, &Path)> {
        let mut named = vec![
            (FUSIONS_OUTPUT, self.fusions.as_path()),
            (DISCARDED_FUSIONS_OUTPUT, self.discarded_fusions.as_path()),
            (LOG_OUTPUT, self.log.as_path()),
        ];
        if let Some(intergenic) = &self.intergenic_fusions {
            named.push((INTERGENIC_FUSIONS_OUTPUT, intergenic.as_path()));
        }
        named
    }

    pub fn write_manifest(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::IOError(format!("Cannot serialize outputs: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}


/// Turns a finished run into declared outputs, or a failure pointing at the log.
pub fn map_outcome(
    tool: &str,
    outcome: ToolOutcome,
    planned: PlannedOutputs,
) -> Result<OutputArtifactSet, PipelineError> {
    if !outcome.success() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            exit_code: outcome.exit_code,
            log: outcome.log_path,
        });
    }

    Ok(OutputArtifactSet {
        fusions: planned.fusions,
        discarded_fusions: planned.discarded_fusions,
        log: outcome.log_path,
        intergenic_fusions: planned.intergenic_fusions,
    })
}


/// Drives a single fusion caller run through resolve, build, run and
/// outcome mapping. `run` consumes the caller.
pub struct FusionCaller {
    settings: FusionSettings,
    progress: Arc<dyn Progress>,
    state: RunState,
}

impl FusionCaller {
    pub fn new(settings: FusionSettings, progress: Arc<dyn Progress>) -> Self {
        Self {
            settings,
            progress,
            state: RunState::NotStarted,
        }
    }

    pub fn settings(&self) -> &FusionSettings {
        &self.settings
    }

    fn transition(&mut self, next: RunState) {
        debug!("{}: {:?} -> {:?}", ARRIBA_TAG, self.state, next);
        self.state = next;
    }

    /// Checks the configuration itself, before any artifact is touched.
    fn validate(&self, inputs: &FusionInputs) -> Result<(), PipelineError> {
        let variant = self.settings.variant;
        if variant.declares_intergenic_output() && self.settings.intergenic_fusions_file.is_none() {
            return Err(PipelineError::ConfigurationGap(format!(
                "variant {} declares a {} output but no intergenic fusions file name is configured",
                variant, INTERGENIC_FUSIONS_OUTPUT
            )));
        }
        if !variant.declares_intergenic_output() && self.settings.intergenic_fusions_file.is_some() {
            warn!("Variant {} does not produce {}; ignoring the configured name", variant, INTERGENIC_FUSIONS_OUTPUT);
        }
        if inputs.genome.is_some() && variant.genome_flag().is_none() {
            warn!("Variant {} takes no genome argument; genome input is ignored", variant);
        }
        if self.settings.output_file.is_empty() || self.settings.discarded_fusions_file.is_empty() {
            return Err(PipelineError::InvalidConfig("Output file names must not be empty".to_string()));
        }
        Ok(())
    }

    fn needs_contigs(&self, inputs: &FusionInputs) -> bool {
        self.settings.derive_contigs
            && inputs.genome.is_some()
            && self.settings.variant.supports_contig_list()
    }

    /// Resolves artifacts and builds the tool configuration without running it.
    /// Every path handed to the tool is absolute, since the tool runs inside
    /// the working directory.
    async fn prepare(&mut self, inputs: &FusionInputs) -> Result<ArribaConfig, PipelineError> {
        self.transition(RunState::Resolving);
        self.validate(inputs)?;

        let cwd = std::env::current_dir()?;
        let workdir = absolutize(&self.settings.workdir, &cwd);
        let optional = |artifact: &Option<FileArtifact>| {
            artifact.as_ref().map(|a| absolutize(a.path(), &cwd))
        };
        let reads = absolutize(&resolve_reads(&inputs.reads, &inputs.chim_out_type)?, &cwd);
        let annotation = absolutize(&inputs.annotation.path, &cwd);
        let genome = optional(&inputs.genome);
        let blacklist = optional(&inputs.blacklist);
        let known_fusions = optional(&inputs.known_fusions);

        let mut required: Vec<(&str, &Path)> = vec![
            ("reads", reads.as_path()),
            ("annotation", annotation.as_path()),
        ];
        for (name, path) in [
            ("genome", &genome),
            ("blacklist", &blacklist),
            ("known_fusions", &known_fusions),
        ] {
            if let Some(path) = path {
                required.push((name, path.as_path()));
            }
        }
        validate_file_inputs(&required)?;

        self.transition(RunState::Building);
        let contigs = if self.needs_contigs(inputs) {
            let contigs = extract_contigs_async(annotation.clone()).await?;
            debug!("Contig allow-list from {}: {}", annotation.display(), contigs);
            Some(contigs)
        } else {
            None
        };

        tokio::fs::create_dir_all(&workdir).await?;

        Ok(ArribaConfig {
            program: self.settings.program.clone(),
            variant: self.settings.variant,
            reads,
            annotation,
            genome,
            blacklist,
            known_fusions,
            contigs,
            outputs: self.settings.planned_outputs(&workdir),
            workdir,
        })
    }

    async fn execute(&mut self, inputs: &FusionInputs) -> Result<OutputArtifactSet, PipelineError> {
        let config = self.prepare(inputs).await?;
        let invocation = build_invocation(&config);
        info!("Running: {}", invocation.display_line());

        self.transition(RunState::Running);
        self.progress.report(PROGRESS_STARTED);
        let outcome = run_logged(&invocation, self.settings.timeout).await?;
        debug!("{} exited with {}", invocation.tool(), outcome.exit_code);

        let outputs = map_outcome(invocation.tool(), outcome, config.outputs)?;
        self.progress.report(PROGRESS_DONE);
        Ok(outputs)
    }

    pub async fn run(mut self, inputs: &FusionInputs) -> Result<OutputArtifactSet, PipelineError> {
        let result = self.execute(inputs).await;
        match &result {
            Ok(_) => self.transition(RunState::Succeeded),
            Err(e) => {
                error!("{} failed: {}", ARRIBA_TAG, e);
                self.transition(RunState::Failed);
            }
        }
        result
    }
}


/// Builds inputs and settings from the command line and runs fusion calling.
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Fusion Calling\n-------------\n");

    let args = &config.args;
    let cwd = &config.cwd;

    let bam = args
        .bam
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidConfig("--bam is required".to_string()))?;
    let gtf = args
        .gtf
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidConfig("--gtf is required".to_string()))?;
    let artifact = |p: &Option<String>| p.as_ref().map(|p| FileArtifact::new(absolutize(Path::new(p), cwd)));

    let inputs = FusionInputs {
        reads: AlignedReadsArtifact {
            bam: absolutize(Path::new(bam), cwd),
            chimeric: args.chimeric.as_ref().map(|c| absolutize(Path::new(c), cwd)),
        },
        chim_out_type: args.chim_out_type.clone(),
        annotation: AnnotationArtifact::new(absolutize(Path::new(gtf), cwd)),
        genome: artifact(&args.genome),
        blacklist: artifact(&args.blacklist),
        known_fusions: artifact(&args.known_fusions),
    };

    let settings = FusionSettings {
        program: args.arriba_bin.clone(),
        variant: args.variant,
        derive_contigs: !args.no_derive_contigs,
        workdir: config.out_dir.clone(),
        sample: args.sample.clone(),
        output_file: args.output_file.clone(),
        discarded_fusions_file: args.discarded_fusions_file.clone(),
        intergenic_fusions_file: args.intergenic_fusions_file.clone(),
        timeout: args.timeout.map(Duration::from_secs),
    };

    if args.check_version {
        let version = check_version(ARRIBA_TAG, &settings.program)
            .await
            .map_err(|e| PipelineError::InvalidConfig(format!("Presence check failed: {}", e)))?;
        info!("Using {} version {}", ARRIBA_TAG, version);
    }

    let caller = FusionCaller::new(settings, Arc::new(LogProgress::new(ARRIBA_TAG)));
    let outputs = caller.run(&inputs).await?;

    for (name, path) in outputs.named() {
        info!("{}: {}", name, path.display());
    }

    if let Some(manifest) = &args.manifest {
        let manifest = absolutize(Path::new(manifest), &config.out_dir);
        outputs.write_manifest(&manifest)?;
        info!("Wrote output manifest to {}", manifest.display());
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingProgress {
        marks: Mutex<Vec<f32>>,
    }

    impl Progress for RecordingProgress {
        fn report(&self, fraction: f32) {
            self.marks.lock().unwrap().push(fraction);
        }
    }

    fn planned() -> PlannedOutputs {
        PlannedOutputs::named(Path::new("/work"), None, "f.tsv", "d.tsv", Some("i.tsv"))
    }

    #[test]
    fn test_map_outcome_success() -> anyhow::Result<()> {
        let outcome = ToolOutcome { exit_code: 0, log_path: PathBuf::from("/work/arriba.log") };
        let outputs = map_outcome("arriba", outcome, planned())?;

        let names: Vec<&str> = outputs.named().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["fusions", "discarded_fusions", "log", "intergenic_fusions"]);
        assert_eq!(outputs.fusions, PathBuf::from("/work/f.tsv"));
        Ok(())
    }

    #[test]
    fn test_map_outcome_failure_carries_log() {
        for code in [1, 137] {
            let outcome = ToolOutcome { exit_code: code, log_path: PathBuf::from("/work/arriba.log") };
            match map_outcome("arriba", outcome, planned()) {
                Err(PipelineError::ToolExecution { exit_code, log, .. }) => {
                    assert_eq!(exit_code, code);
                    assert_eq!(log, PathBuf::from("/work/arriba.log"));
                }
                other => panic!("Expected ToolExecution, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_manifest_skips_missing_intergenic() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let outputs = OutputArtifactSet {
            fusions: PathBuf::from("f.tsv"),
            discarded_fusions: PathBuf::from("d.tsv"),
            log: PathBuf::from("arriba.log"),
            intergenic_fusions: None,
        };
        let manifest = dir.path().join("outputs.json");
        outputs.write_manifest(&manifest)?;

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&manifest)?)?;
        assert_eq!(json["fusions"], "f.tsv");
        assert_eq!(json["log"], "arriba.log");
        assert!(json.get("intergenic_fusions").is_none());
        Ok(())
    }

    #[test]
    fn test_planned_outputs_follow_variant() {
        let mut settings = FusionSettings {
            intergenic_fusions_file: Some("intergenic.tsv".to_string()),
            ..Default::default()
        };
        let workdir = Path::new("/work");
        assert_eq!(settings.planned_outputs(workdir).intergenic_fusions, None);
        settings.variant = ToolVariant::BlacklistAsGenome;
        assert_eq!(
            settings.planned_outputs(workdir).intergenic_fusions,
            Some(PathBuf::from("/work/intergenic.tsv"))
        );
    }

    #[tokio::test]
    async fn test_intergenic_gap_fails_before_resolving_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let settings = FusionSettings {
            variant: ToolVariant::BlacklistAsGenome,
            workdir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let progress = Arc::new(RecordingProgress::default());
        let caller = FusionCaller::new(settings, progress.clone());
        let inputs = FusionInputs {
            reads: AlignedReadsArtifact { bam: dir.path().join("none.bam"), chimeric: None },
            chim_out_type: "within-container".to_string(),
            annotation: AnnotationArtifact::new(dir.path().join("none.gtf")),
            genome: None,
            blacklist: None,
            known_fusions: None,
        };

        assert!(matches!(caller.run(&inputs).await, Err(PipelineError::ConfigurationGap(_))));
        assert!(progress.marks.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_mode_builds_nothing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let workdir = dir.path().join("out");
        let bam = dir.path().join("s.bam");
        let gtf = dir.path().join("s.gtf");
        std::fs::write(&bam, b"")?;
        std::fs::write(&gtf, "chr1\tx\n")?;

        let settings = FusionSettings { workdir: workdir.clone(), ..Default::default() };
        let caller = FusionCaller::new(settings, Arc::new(RecordingProgress::default()));
        let inputs = FusionInputs {
            reads: AlignedReadsArtifact { bam, chimeric: None },
            chim_out_type: "Junctions".to_string(),
            annotation: AnnotationArtifact::new(gtf),
            genome: None,
            blacklist: None,
            known_fusions: None,
        };

        assert!(matches!(caller.run(&inputs).await, Err(PipelineError::InvalidMode(_))));
        assert!(!workdir.exists(), "No working area is prepared for an invalid mode");
        Ok(())
    }

    #[tokio::test]
    async fn test_prepare_derives_contigs_only_with_genome() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let bam = dir.path().join("s.bam");
        let gtf = dir.path().join("s.gtf");
        let genome = dir.path().join("genome.fa");
        std::fs::write(&bam, b"")?;
        std::fs::write(&gtf, "chr2\ta\nchr1\tb\nchr2\tc\n")?;
        std::fs::write(&genome, ">chr1\nACGT\n")?;

        let mut inputs = FusionInputs {
            reads: AlignedReadsArtifact { bam, chimeric: None },
            chim_out_type: "WithinBam".to_string(),
            annotation: AnnotationArtifact::new(gtf),
            genome: None,
            blacklist: None,
            known_fusions: None,
        };
        let settings = FusionSettings { workdir: dir.path().join("out"), ..Default::default() };

        let mut caller = FusionCaller::new(settings.clone(), Arc::new(RecordingProgress::default()));
        let without_genome = caller.prepare(&inputs).await?;
        assert_eq!(without_genome.contigs, None);
        assert_eq!(caller.state, RunState::Building);

        inputs.genome = Some(FileArtifact::new(genome));
        let mut caller = FusionCaller::new(settings.clone(), Arc::new(RecordingProgress::default()));
        let with_genome = caller.prepare(&inputs).await?;
        let mut contigs: Vec<&str> = with_genome.contigs.as_deref().unwrap_or_default().split(' ').collect();
        contigs.sort();
        assert_eq!(contigs, vec!["chr1", "chr2"]);

        let no_derive = FusionSettings { derive_contigs: false, ..settings };
        let mut caller = FusionCaller::new(no_derive, Arc::new(RecordingProgress::default()));
        assert_eq!(caller.prepare(&inputs).await?.contigs, None);
        Ok(())
    }
}
