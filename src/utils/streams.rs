// src/utils/streams.rs: Child process output handling
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use anyhow::anyhow;
use futures::future::join_all;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use crate::config::defs::{PipelineError, LOG_CHANNEL_CAPACITY, LOG_DRAIN_GRACE};
use crate::utils::command::ToolInvocation;


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildStream {
    Stdout,
    Stderr,
    /// Stdout lines followed by stderr lines, both read concurrently.
    Combined,
}


/// Exit status and log location of one finished tool run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub exit_code: i32,
    pub log_path: PathBuf,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}


async fn read_lines<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    if let Some(reader) = reader {
        let mut reader = BufReader::new(reader).lines();
        while let Some(line) = reader.next_line().await? {
            lines.push(line);
        }
    }
    Ok(lines)
}


/// Reads a child's output stream(s) to completion.
///
/// # Arguments
///
/// * `child` - Spawned child with piped output.
/// * `stream` - Which stream(s) to read.
///
/// # Returns
/// Lines of output.
pub async fn read_child_output_to_vec(child: &mut Child, stream: ChildStream) -> anyhow::Result<Vec<String>> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let lines = match stream {
        ChildStream::Stdout => read_lines(stdout).await?,
        ChildStream::Stderr => read_lines(stderr).await?,
        ChildStream::Combined => {
            let (mut out, err) = tokio::try_join!(read_lines(stdout), read_lines(stderr))?;
            out.extend(err);
            out
        }
    };
    if stream != ChildStream::Combined && lines.is_empty() {
        return Err(anyhow!("No output captured from child {:?}", stream));
    }
    Ok(lines)
}


/// Forwards newline-terminated chunks from a child pipe into the log channel.
fn forward_chunks<R>(reader: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<io::Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        loop {
            let mut chunk = Vec::new();
            let n = reader.read_until(b'\n', &mut chunk).await?;
            if n == 0 {
                break;
            }
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
        Ok(())
    })
}


/// Drains the log channel into the log file, flushing after every chunk so
/// the log is usable even if the process is killed.
fn spawn_log_writer(
    mut file: tokio::fs::File,
    rx: mpsc::Receiver<Vec<u8>>,
    tool: String,
) -> JoinHandle<io::Result<u64>> {
    tokio::spawn(async move {
        let mut stream = ReceiverStream::new(rx);
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            debug!("[{}] {}", tool, String::from_utf8_lossy(&chunk).trim_end());
            file.write_all(&chunk).await?;
            file.flush().await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    })
}


fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}


/// Runs a tool invocation, capturing stdout and stderr interleaved into its
/// log file while the process runs.
///
/// # Arguments
///
/// * `invocation` - Built command.
/// * `deadline` - Optional wall clock limit. On expiry the child is killed.
///
/// # Returns
/// ToolOutcome, or TimedOut when the deadline passed.
pub async fn run_logged(
    invocation: &ToolInvocation,
    deadline: Option<Duration>,
) -> Result<ToolOutcome, PipelineError> {
    let tool = invocation.tool().to_string();
    let log_path = invocation.log_path().to_path_buf();
    let log_file = tokio::fs::File::create(&log_path).await?;

    let mut child = Command::new(invocation.program())
        .args(invocation.args())
        .current_dir(invocation.workdir())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::Spawn {
            tool: tool.clone(),
            error: e.to_string(),
        })?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>(LOG_CHANNEL_CAPACITY);
    let writer_task = spawn_log_writer(log_file, rx, tool.clone());

    let mut reader_tasks = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        reader_tasks.push(forward_chunks(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        reader_tasks.push(forward_chunks(stderr, tx.clone()));
    }
    drop(tx);

    let wait_result = match deadline {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => Some(status),
            Err(_) => {
                warn!("{} exceeded {:?}, killing pid {:?}", tool, limit, child.id());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", tool, e);
                }
                None
            }
        },
        None => Some(child.wait().await),
    };

    // Pipes can stay open in orphaned grandchildren; do not wait on them forever.
    let abort_handles: Vec<_> = reader_tasks.iter().map(|t| t.abort_handle()).collect();
    match timeout(LOG_DRAIN_GRACE, join_all(reader_tasks)).await {
        Ok(results) => {
            for result in results {
                match result {
                    Ok(Err(e)) => warn!("Error reading {} output: {}", tool, e),
                    Err(e) => warn!("{} output reader failed: {}", tool, e),
                    Ok(Ok(())) => {}
                }
            }
        }
        Err(_) => {
            warn!("{} output still open after exit, closing log", tool);
            for handle in abort_handles {
                handle.abort();
            }
        }
    }

    let written = writer_task
        .await
        .map_err(|e| PipelineError::IOError(format!("Log writer for {} failed: {}", tool, e)))??;
    debug!("{} wrote {} bytes to {}", tool, written, log_path.display());

    match wait_result {
        Some(status) => Ok(ToolOutcome {
            exit_code: exit_code(status?),
            log_path,
        }),
        None => Err(PipelineError::TimedOut {
            tool,
            after: deadline.unwrap_or_default(),
            log: log_path,
        }),
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str, dir: &std::path::Path) -> ToolInvocation {
        ToolInvocation::new(
            "sh",
            "sh",
            vec!["-c".to_string(), script.to_string()],
            dir.join("tool.log"),
            dir.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_run_logged_captures_both_streams() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let outcome = run_logged(&sh("echo out; echo err 1>&2; exit 0", dir.path()), None).await?;

        assert!(outcome.success());
        let log = std::fs::read_to_string(&outcome.log_path)?;
        assert!(log.contains("out\n"));
        assert!(log.contains("err\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_logged_chronological_order() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let script = "echo first; sleep 0.2; echo second 1>&2; sleep 0.2; echo third";
        let outcome = run_logged(&sh(script, dir.path()), None).await?;

        assert_eq!(std::fs::read_to_string(&outcome.log_path)?, "first\nsecond\nthird\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_logged_nonzero_exit() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let outcome = run_logged(&sh("echo boom 1>&2; exit 3", dir.path()), None).await?;

        assert_eq!(outcome.exit_code, 3);
        assert_eq!(std::fs::read_to_string(&outcome.log_path)?, "boom\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_logged_signal_exit_code() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let outcome = run_logged(&sh("echo dying; kill -9 $$", dir.path()), None).await?;

        assert_eq!(outcome.exit_code, 137);
        assert!(std::fs::read_to_string(&outcome.log_path)?.contains("dying"));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_logged_runs_in_workdir() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let outcome = run_logged(&sh("touch made_here", dir.path()), None).await?;

        assert!(outcome.success());
        assert!(dir.path().join("made_here").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_logged_timeout_keeps_partial_log() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let invocation = sh("echo started; exec sleep 30", dir.path());
        let start = std::time::Instant::now();
        let result = run_logged(&invocation, Some(Duration::from_millis(500))).await;

        match result {
            Err(PipelineError::TimedOut { log, after, .. }) => {
                assert_eq!(after, Duration::from_millis(500));
                assert_eq!(std::fs::read_to_string(&log)?, "started\n");
            }
            other => panic!("Expected TimedOut, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_logged_missing_program() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let invocation = ToolInvocation::new(
            "ghost",
            "/nonexistent/ghost-tool",
            Vec::new(),
            dir.path().join("ghost.log"),
            dir.path().to_path_buf(),
        );

        assert!(matches!(run_logged(&invocation, None).await, Err(PipelineError::Spawn { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_child_output_combined() -> anyhow::Result<()> {
        let mut child = Command::new("sh")
            .args(["-c", "echo a; echo b 1>&2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let lines = read_child_output_to_vec(&mut child, ChildStream::Combined).await?;
        child.wait().await?;
        assert_eq!(lines, vec!["a", "b"]);
        Ok(())
    }
}
