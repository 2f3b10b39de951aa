//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - `src/bin/` 下的实例程序（通过 `comm` 收发消息）
//! - 真实进程 + 路由器的端到端测试（`tests/`）
//! - 测试辅助：启动 N 个实例并收集输出

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use contracts::{RunError, RunResult};
use output::feed_input;
use router::{InstanceRouter, RouterConfig};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Upper bound for a whole test run
pub const RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of [`run_instances`]
#[derive(Debug)]
pub struct Outcome {
    pub result: RunResult,
    /// Captured stdout per instance
    pub stdout: Vec<Vec<u8>>,
}

impl Outcome {
    pub fn stdout_of(&self, instance: usize) -> String {
        String::from_utf8_lossy(&self.stdout[instance]).into_owned()
    }
}

/// Run `instances` copies of `binary`, replaying `input` to each one's stdin
/// and capturing every stdout separately
pub async fn run_instances(
    binary: &Path,
    instances: usize,
    input: &[u8],
) -> Result<Outcome, RunError> {
    let mut router = InstanceRouter::new(RouterConfig::new(instances))?;

    let (mut writer, distributor) = broadcast::channel();
    writer
        .write(input.to_vec())
        .map_err(|e| RunError::system("buffering input", e.into()))?;
    writer.close();

    let mut captures: Vec<JoinHandle<Vec<u8>>> = Vec::with_capacity(instances);
    for _ in 0..instances {
        let mut command = Command::new(binary);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let spawned = router.launch(command)?;

        if let Some(stdin) = spawned.stdin {
            let mut reader = distributor.new_reader();
            router.supervise_input(async move {
                feed_input(&mut reader, stdin)
                    .await
                    .map(drop)
                    .map_err(|e| RunError::system("feeding input", e))
            });
        }

        let stdout = spawned.stdout;
        captures.push(tokio::spawn(async move {
            let mut captured = Vec::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_end(&mut captured).await;
            }
            captured
        }));
    }

    let result = match tokio::time::timeout(RUN_TIMEOUT, router.run()).await {
        Ok(result) => result,
        Err(_) => {
            return Err(RunError::system(
                "run timed out",
                std::io::Error::from(std::io::ErrorKind::TimedOut),
            ))
        }
    };

    let mut stdout = Vec::with_capacity(instances);
    for capture in captures {
        stdout.push(capture.await.unwrap_or_default());
    }
    Ok(Outcome { result, stdout })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_programs_run_without_messages() {
        let outcome = run_instances(Path::new("cat"), 3, b"same input\n")
            .await
            .unwrap();
        assert!(outcome.result.is_success(), "{:?}", outcome.result.error);
        for i in 0..3 {
            assert_eq!(outcome.stdout_of(i), "same input\n");
            assert_eq!(outcome.result.instances[i].messages_sent, 0);
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let err = run_instances(Path::new("/nonexistent/parunner-instance"), 2, b"")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::StartFailed { instance: 0, .. }));
    }
}
