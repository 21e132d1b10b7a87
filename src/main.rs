use std::time::{Instant, SystemTime};
use std::{env, fs};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::DateTime;

use anyhow::Result;
use log::{self, LevelFilter, error, info};
use env_logger::Builder;
use seqtoid_fusion::cli::{parse, Arguments};
use seqtoid_fusion::config::defs::{PipelineError, RunConfig};
use seqtoid_fusion::pipelines::fusion_calling;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n SeqToID Fusion\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let out_dir = setup_output_dir(&args, &dir)?;
    info!("Working directory is {:?}\n", out_dir);
    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        out_dir,
        args,
        log_level,
    });

    if let Err(e) = match module.as_str() {
        "arriba" => fusion_calling_run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn fusion_calling_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    fusion_calling::run(run_config).await
}

/// Sets up output directory
/// If `out_dir` is specified from args, uses it;
/// otherwise, creates a directory named `<sample_base>_YYYYMMDD`, where the
/// sample base is `--sample` or the stem of the reads file.
/// Ensures the directory exists.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &Arguments, cwd: &PathBuf) -> Result<PathBuf> {
    let out_dir = match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        }
        None => {
            let dir_base = match (&args.sample, &args.bam) {
                (Some(sample), _) => sample.clone(),
                (None, Some(bam)) => Path::new(bam)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "default_sample".to_string()),
                (None, None) => return Err(anyhow::anyhow!("Reads path (--bam) required")),
            };

            let timestamp = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .map(|secs| {
                    DateTime::from_timestamp(secs as i64, 0)
                        .map(|dt| dt.format("%Y%m%d").to_string())
                        .unwrap_or_else(|| "19700101".to_string())
                })
                .unwrap_or_else(|_| "19700101".to_string());
            cwd.join(format!("{}_{}", dir_base, timestamp))
        }
    };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}
