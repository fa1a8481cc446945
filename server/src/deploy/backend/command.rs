//! Command backend: drives an external deployer executable

use std::io::{ErrorKind, Read, Write};
use std::process::{ExitStatus, Stdio};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::deploy::backend::{BackendError, BundleBackend};
use crate::models::bundle::Bundle;
use crate::models::user::User;

/// Interval between exit checks of a blocking import
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a failed import may keep delivering stderr after it exited
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Runs `<program> <args...> validate|import <name>` with the bundle YAML on
/// stdin. A zero exit status means success.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    validate_timeout: Duration,
    import_timeout: Duration,
}

impl CommandBackend {
    pub fn new(
        program: String,
        args: Vec<String>,
        validate_timeout: Duration,
        import_timeout: Duration,
    ) -> Self {
        Self {
            program,
            args,
            validate_timeout,
            import_timeout,
        }
    }

    fn failure(&self, status: ExitStatus, stderr: &str) -> BackendError {
        let stderr = stderr.trim();
        if stderr.is_empty() {
            BackendError::Rejected(format!("{} exited with {}", self.program, status))
        } else {
            BackendError::Rejected(stderr.to_string())
        }
    }

    fn spawn_blocking_child(
        &self,
        action: &str,
        user: &User,
        name: &str,
    ) -> anyhow::Result<std::process::Child> {
        std::process::Command::new(&self.program)
            .args(&self.args)
            .args([action, name])
            .env("DEPLOYER_USER", &user.username)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))
    }

    fn run_import(&self, user: &User, name: &str, yaml: String) -> anyhow::Result<Result<(), BackendError>> {
        let mut child = self.spawn_blocking_child("import", user, name)?;

        // Feed stdin and drain stderr off-thread so a child that ignores
        // either pipe cannot stall the deadline check below. Neither helper
        // is ever joined: a process left behind by the deployer may keep the
        // pipes open long after the deployer itself exited.
        let stdin = child.stdin.take();
        std::thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(yaml.as_bytes()) {
                    if e.kind() != ErrorKind::BrokenPipe {
                        warn!("Failed to write bundle to deployer stdin: {}", e);
                    }
                }
            }
        });
        let (stderr_tx, stderr_rx) = std_mpsc::channel::<Vec<u8>>();
        let stderr = child.stderr.take();
        std::thread::spawn(move || {
            let Some(mut stderr) = stderr else {
                return;
            };
            let mut buf = [0u8; 4096];
            loop {
                match stderr.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stderr_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let deadline = Instant::now() + self.import_timeout;
        let status = loop {
            if let Some(status) = child.try_wait().context("failed to poll deployer process")? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!("Import of {} timed out, killing {}", name, self.program);
                let _ = child.kill();
                let _ = child.wait();
                return Ok(Err(BackendError::TimedOut(self.import_timeout)));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if status.success() {
            Ok(Ok(()))
        } else {
            let stderr = collect_stderr(&stderr_rx, STDERR_GRACE);
            Ok(Err(self.failure(status, &stderr)))
        }
    }

    async fn run_validate(&self, user: &User, name: &str, yaml: String) -> anyhow::Result<Result<(), BackendError>> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .args(["validate", name])
            .env("DEPLOYER_USER", &user.username)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(yaml.as_bytes()).await {
                    if e.kind() != ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
            }
            Ok(())
        };

        // The write shares the deadline with the wait: a validator that never
        // reads stdin must not hold the call past its timeout. Dropping the
        // child on timeout kills it.
        let run = async move {
            let (written, output) = tokio::join!(write, child.wait_with_output());
            written.context("failed to write bundle to deployer stdin")?;
            output.context("failed to wait for deployer process")
        };

        match tokio::time::timeout(self.validate_timeout, run).await {
            Err(_) => Ok(Err(BackendError::TimedOut(self.validate_timeout))),
            Ok(output) => {
                let output = output?;
                if output.status.success() {
                    Ok(Ok(()))
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Ok(Err(self.failure(output.status, &stderr)))
                }
            }
        }
    }
}

/// Gather stderr chunks until the pipe closes or `grace` runs out
fn collect_stderr(chunks: &std_mpsc::Receiver<Vec<u8>>, grace: Duration) -> String {
    let deadline = Instant::now() + grace;
    let mut output = Vec::new();
    while let Ok(chunk) = chunks.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        output.extend_from_slice(&chunk);
    }
    String::from_utf8_lossy(&output).into_owned()
}

#[async_trait]
impl BundleBackend for CommandBackend {
    async fn validate(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), BackendError> {
        debug!("Validating bundle {} with {}", name, self.program);
        let yaml = bundle
            .to_yaml()
            .map_err(|e| BackendError::Fault(e.to_string()))?;
        self.run_validate(user, name, yaml)
            .await
            .unwrap_or_else(|e| Err(BackendError::Fault(format!("{:#}", e))))
    }

    fn import_bundle(&self, user: &User, name: &str, bundle: &Bundle) -> Result<(), BackendError> {
        debug!("Importing bundle {} with {}", name, self.program);
        let yaml = bundle
            .to_yaml()
            .map_err(|e| BackendError::Fault(e.to_string()))?;
        self.run_import(user, name, yaml)
            .unwrap_or_else(|e| Err(BackendError::Fault(format!("{:#}", e))))
    }

    fn kind(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Backend running a shell script; `$0` is the action and `$1` the name
    fn script(body: &str, timeout: Duration) -> CommandBackend {
        CommandBackend::new(
            "sh".to_string(),
            vec!["-c".to_string(), body.to_string()],
            timeout,
            timeout,
        )
    }

    fn bundle() -> Bundle {
        Bundle::new(serde_json::json!({"services": {"mysql": {"charm": "cs:precise/mysql"}}}))
    }

    #[tokio::test]
    async fn test_validate_success() {
        let backend = script(
            r#"cat > /dev/null; [ "$0" = validate ] && [ "$1" = db ] && [ "$DEPLOYER_USER" = admin ]"#,
            Duration::from_secs(10),
        );
        let result = backend.validate(&User::new("admin"), "db", &bundle()).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_validate_rejection_uses_stderr() {
        let backend = script(
            "cat > /dev/null; echo 'service mysql already exists' >&2; exit 1",
            Duration::from_secs(10),
        );
        let result = backend.validate(&User::anonymous(), "db", &bundle()).await;
        assert_eq!(
            result,
            Err(BackendError::Rejected("service mysql already exists".to_string()))
        );
    }

    #[tokio::test]
    async fn test_validate_timeout() {
        let backend = script("sleep 5", Duration::from_millis(100));
        let result = backend.validate(&User::anonymous(), "db", &bundle()).await;
        assert_eq!(result, Err(BackendError::TimedOut(Duration::from_millis(100))));
    }

    fn large_bundle() -> Bundle {
        Bundle::new(serde_json::json!({
            "services": {"mysql": {"charm": "cs:precise/mysql"}},
            "annotations": {"notes": "x".repeat(512 * 1024)}
        }))
    }

    #[tokio::test]
    async fn test_validate_timeout_covers_unread_stdin() {
        let backend = script("sleep 3; exit 0", Duration::from_millis(200));
        let started = Instant::now();
        let result = backend.validate(&User::anonymous(), "db", &large_bundle()).await;
        assert_eq!(result, Err(BackendError::TimedOut(Duration::from_millis(200))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_validate_accepts_large_bundle() {
        let backend = script("cat > /dev/null", Duration::from_secs(10));
        let result = backend.validate(&User::anonymous(), "db", &large_bundle()).await;
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_import_receives_yaml_on_stdin() {
        let backend = script(
            r#"[ "$0" = import ] && grep -q 'cs:precise/mysql'"#,
            Duration::from_secs(10),
        );
        let result = backend.import_bundle(&User::anonymous(), "db", &bundle());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_import_failure_without_stderr() {
        let backend = script("cat > /dev/null; exit 3", Duration::from_secs(10));
        let err = backend
            .import_bundle(&User::anonymous(), "db", &bundle())
            .unwrap_err();
        match err {
            BackendError::Rejected(message) => assert!(message.starts_with("sh exited with")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_import_timeout_kills_child() {
        let backend = script("sleep 5", Duration::from_millis(200));
        let started = Instant::now();
        let result = backend.import_bundle(&User::anonymous(), "db", &bundle());
        assert_eq!(result, Err(BackendError::TimedOut(Duration::from_millis(200))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_is_a_fault() {
        let backend = CommandBackend::new(
            "/nonexistent/deployer".to_string(),
            vec![],
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let err = backend
            .import_bundle(&User::anonymous(), "db", &bundle())
            .unwrap_err();
        assert!(matches!(err, BackendError::Fault(_)));
    }

    #[test]
    fn test_import_does_not_wait_for_leftover_processes() {
        let backend = script("cat > /dev/null; sleep 4 & exit 0", Duration::from_secs(10));
        let started = Instant::now();
        let result = backend.import_bundle(&User::anonymous(), "db", &bundle());
        assert_eq!(result, Ok(()));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_import_failure_with_leftover_process_keeps_stderr() {
        let backend = script(
            "cat > /dev/null; sleep 4 & echo 'relation failed' >&2; exit 1",
            Duration::from_secs(10),
        );
        let started = Instant::now();
        let result = backend.import_bundle(&User::anonymous(), "db", &bundle());
        assert_eq!(result, Err(BackendError::Rejected("relation failed".to_string())));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
