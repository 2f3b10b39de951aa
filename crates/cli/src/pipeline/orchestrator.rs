//! Pipeline orchestrator - wires instances, streams and the router together.
//!
//! ```text
//!   our stdin ──▶ BroadcastWriter ──▶ reader i ──▶ instance i stdin
//!   instance i stdout ──▶ contest arbiter | tagger | file | inherited
//!   instance i stderr ──▶ tagger | file | inherited
//!   instance i fd 3/4 ◀─▶ InstanceRouter
//! ```

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Instant;

use broadcast::{BroadcastDistributor, BroadcastWriter};
use bytes::Bytes;
use contracts::{InstanceId, RunConfig, RunError, StderrMode, StdoutMode};
use output::{
    copy_to_contest, default_stem, feed_input, output_file_path, stream_prefix, tag_lines,
    write_to_file, MuxWriter, OutputArbiter, OutputMux, StreamKind,
};
use router::{InstanceRouter, RouterConfig, SpawnedInstance};
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::PipelineStats;
use crate::error::{CliError, Result};

/// Size of one read from our own stdin
const INPUT_CHUNK: usize = 64 * 1024;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated run configuration
    pub run: RunConfig,

    /// Binary every instance runs
    pub binary: PathBuf,

    /// Arguments passed to every instance
    pub args: Vec<OsString>,
}

impl PipelineConfig {
    /// Stem of `files` mode output paths
    pub fn output_stem(&self) -> PathBuf {
        match &self.run.prefix {
            Some(prefix) => PathBuf::from(prefix),
            None => default_stem(&self.binary),
        }
    }
}

/// Where instance output goes
struct Outputs {
    stdout: OutputMux<tokio::io::Stdout>,
    stderr: OutputMux<tokio::io::Stderr>,
    arbiter: OutputArbiter,
    stem: PathBuf,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run every instance to completion
    ///
    /// A failed run is not an `Err` here: the router's verdict is in
    /// [`PipelineStats::result`]. `Err` means our own plumbing failed.
    #[instrument(
        name = "pipeline_run",
        skip(self),
        fields(binary = %self.config.binary.display(), instances = self.config.run.instances)
    )]
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let run = &self.config.run;

        let stdout = OutputMux::spawn("stdout", tokio::io::stdout());
        let stderr = OutputMux::spawn("stderr", tokio::io::stderr());
        let outputs = Outputs {
            arbiter: OutputArbiter::new(stdout.writer()),
            stem: self.config.output_stem(),
            stdout,
            stderr,
        };

        let mut router_config = RouterConfig::from_run_config(run);
        if run.trace_comm {
            router_config = router_config.with_trace(outputs.stderr.writer());
        }
        let mut router = InstanceRouter::new(router_config)?;

        let (input, distributor) = broadcast::channel();
        router.supervise_input(pump_stdin(input));

        for _ in 0..run.instances {
            match router.launch(self.command()) {
                Ok(spawned) => self.wire(&mut router, spawned, &distributor, &outputs),
                Err(e) => {
                    router.abort(e);
                    break;
                }
            }
        }
        info!(instances = run.instances, "Instances launched");

        let result = router.run().await;
        let input_bytes = distributor.bytes_written();
        drop(distributor);

        let Outputs {
            stdout,
            stderr,
            arbiter,
            ..
        } = outputs;
        if let Some(owner) = arbiter.owner() {
            debug!(owner, "Contest output owner");
        }
        drop(arbiter);

        let stdout_metrics = stdout.metrics().snapshot();
        let stderr_metrics = stderr.metrics().snapshot();
        let flushed = flush_outputs(stdout, stderr).await;

        let stats = PipelineStats {
            result,
            duration: start_time.elapsed(),
            input_bytes,
            stdout: stdout_metrics,
            stderr: stderr_metrics,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            success = stats.result.is_success(),
            orphans = stats.result.remaining.len(),
            "Run finished"
        );

        match flushed {
            // The run's own failure is the more useful report
            Err(e) if stats.result.is_success() => Err(e),
            Err(e) => {
                warn!(error = %e, "Output flush failed after a failed run");
                Ok(stats)
            }
            Ok(()) => Ok(stats),
        }
    }

    /// Command for one instance; identity and comm fds are added by the router
    fn command(&self) -> Command {
        let run = &self.config.run;
        let mut command = Command::new(&self.config.binary);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(match run.stdout {
                StdoutMode::All => Stdio::inherit(),
                _ => Stdio::piped(),
            })
            .stderr(match run.stderr {
                StderrMode::All => Stdio::inherit(),
                _ => Stdio::piped(),
            });
        command
    }

    /// Attach a launched instance's standard streams
    fn wire(
        &self,
        router: &mut InstanceRouter,
        spawned: SpawnedInstance,
        distributor: &BroadcastDistributor,
        outputs: &Outputs,
    ) {
        let SpawnedInstance {
            id,
            stdin,
            stdout,
            stderr,
            ..
        } = spawned;

        if let Some(stdin) = stdin {
            let mut reader = distributor.new_reader();
            router.supervise_input(async move {
                feed_input(&mut reader, stdin)
                    .await
                    .map(drop)
                    .map_err(|e| RunError::system(format!("replaying input to instance {id}"), e))
            });
        }

        if let Some(stdout) = stdout {
            match self.config.run.stdout {
                StdoutMode::Contest => {
                    let writer = outputs.arbiter.writer_for(id);
                    router.supervise(async move {
                        copy_to_contest(stdout, &writer)
                            .await
                            .map(drop)
                            .map_err(RunError::from)
                    });
                }
                StdoutMode::Tagged => {
                    router.supervise(tag_stream(StreamKind::Stdout, id, stdout, outputs.stdout.writer()))
                }
                StdoutMode::Files => {
                    let path = output_file_path(&outputs.stem, StreamKind::Stdout, id);
                    router.supervise(save_stream(path, stdout));
                }
                StdoutMode::All => {}
            }
        }

        if let Some(stderr) = stderr {
            match self.config.run.stderr {
                StderrMode::Tagged => {
                    router.supervise(tag_stream(StreamKind::Stderr, id, stderr, outputs.stderr.writer()))
                }
                StderrMode::Files => {
                    let path = output_file_path(&outputs.stem, StreamKind::Stderr, id);
                    router.supervise(save_stream(path, stderr));
                }
                StderrMode::All => {}
            }
        }
    }
}

async fn tag_stream<R>(
    stream: StreamKind,
    id: InstanceId,
    src: R,
    mut dst: MuxWriter,
) -> std::result::Result<(), RunError>
where
    R: AsyncRead + Unpin,
{
    tag_lines(&stream_prefix(stream, id), src, &mut dst)
        .await
        .map(drop)
        .map_err(|e| RunError::system(format!("tagging {stream} of instance {id}"), e))
}

async fn save_stream<R>(path: PathBuf, src: R) -> std::result::Result<(), RunError>
where
    R: AsyncRead + Unpin,
{
    write_to_file(&path, src)
        .await
        .map(drop)
        .map_err(|e| RunError::system(format!("writing {}", path.display()), e))
}

/// Replay our stdin into the broadcast stream
///
/// Reads happen on a detached thread: a blocking stdin read cannot be
/// cancelled and must not hold up runtime shutdown.
async fn pump_stdin(mut input: BroadcastWriter) -> std::result::Result<(), RunError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _detached = thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || read_stdin(tx))
        .map_err(|e| RunError::system("starting stdin reader", e))?;

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk.map_err(|e| RunError::system("reading stdin", e))?;
        input
            .write(chunk)
            .map_err(|e| RunError::system("replaying stdin", io::Error::from(e)))?;
    }

    debug!(bytes = input.bytes_written(), "Input closed");
    input.close();
    Ok(())
}

fn read_stdin(tx: mpsc::UnboundedSender<io::Result<Bytes>>) {
    let mut stdin = io::stdin().lock();
    let mut buf = vec![0u8; INPUT_CHUNK];
    loop {
        let chunk = match stdin.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed = chunk.is_err();
        if tx.send(chunk).is_err() || failed {
            return;
        }
    }
}

async fn flush_outputs(
    stdout: OutputMux<tokio::io::Stdout>,
    stderr: OutputMux<tokio::io::Stderr>,
) -> Result<()> {
    let stdout = stdout.shutdown().await;
    let stderr = stderr.shutdown().await;
    stdout.map_err(|e| CliError::output_flush("stdout", e))?;
    stderr.map_err(|e| CliError::output_flush("stderr", e))?;
    Ok(())
}

/// Resolve `binary` the way it will be executed, so `files` stems are stable
pub fn resolve_binary(binary: &Path) -> io::Result<PathBuf> {
    std::path::absolute(binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(prefix: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            run: RunConfig {
                prefix: prefix.map(String::from),
                ..RunConfig::default()
            },
            binary: PathBuf::from("/work/solution.bin"),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_output_stem_defaults_to_binary() {
        assert_eq!(config(None).output_stem(), PathBuf::from("/work/solution"));
        assert_eq!(
            config(Some("out/run")).output_stem(),
            PathBuf::from("out/run")
        );
    }

    #[test]
    fn test_resolve_binary_is_absolute() {
        let resolved = resolve_binary(Path::new("solution")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("solution"));
    }

    #[tokio::test]
    async fn test_tagged_stream_reaches_mux() {
        let mux = OutputMux::spawn("test", Vec::new());
        tag_stream(StreamKind::Stderr, 4, &b"a\nb"[..], mux.writer())
            .await
            .unwrap();
        let out = mux.shutdown().await.unwrap();
        assert_eq!(out, b"STDERR 4: a\nSTDERR 4: b");
    }

    #[tokio::test]
    async fn test_saved_stream_lands_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.stdout.0");
        save_stream(path.clone(), &b"result\n"[..]).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"result\n");
    }

    #[tokio::test]
    async fn test_save_stream_reports_path() {
        let err = save_stream(PathBuf::from("/nonexistent/dir/x.stdout.0"), &b""[..])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dir/x.stdout.0"));
    }
}
