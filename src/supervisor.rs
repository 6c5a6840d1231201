use crate::config::{TestRunConfig, ValgrindMode};
use crate::error::HarnessError;
use crate::readiness::{ReadinessChannel, READY_PAYLOAD};
use crate::runner::{Scenario, ScenarioRunner};
use crate::Result;
use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Environment variables forwarded verbatim to the server when set in the
/// harness's own environment. These support instrumentation shims around
/// the server-under-test.
const PASSTHROUGH_VARS: &[&str] = &["LD_PRELOAD", "TEST_SOCKET_PATH"];

/// Outer bound on the readiness wait. A wedged server fails the suite
/// with a setup error instead of hanging it.
pub const READINESS_WAIT: Duration = Duration::from_secs(30);

/// Owns the server-under-test child process from launch to termination.
///
/// One instance supervises exactly one launch; there is no restart. The
/// child is killed on drop, so an aborted suite cannot leak a server.
pub struct ServerProcess {
    child: Option<Child>,
    command_line: String,
}

impl ServerProcess {
    /// Launches `[valgrind [flags]] <binary> -f <config> -P <pid file>`
    /// with a minimal environment: the readiness endpoint plus the
    /// pass-through variables present in the harness's environment.
    pub fn spawn(config: &TestRunConfig, notify_socket: &Path, pid_file: &Path) -> Result<Self> {
        let mut argv: Vec<String> = Vec::new();
        match config.valgrind {
            ValgrindMode::Off => {}
            ValgrindMode::Summary => argv.push("valgrind".into()),
            ValgrindMode::Full => {
                argv.push("valgrind".into());
                argv.push("--show-leak-kinds=all".into());
                argv.push("--leak-check=full".into());
            }
        }
        argv.push(config.binary.display().to_string());
        argv.push("-f".into());
        argv.push(config.config_file.display().to_string());
        argv.push("-P".into());
        argv.push(pid_file.display().to_string());

        let command_line = argv.join(" ");
        info!(command = %command_line, "starting server under test");

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command.env_clear();
        command.env("NOTIFY_SOCKET", notify_socket);
        for var in PASSTHROUGH_VARS {
            if let Ok(value) = std::env::var(var) {
                debug!(var, "forwarding environment variable");
                command.env(var, value);
            }
        }
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|source| HarnessError::SpawnFailed {
            command: command_line.clone(),
            source,
        })?;

        Ok(Self {
            child: Some(child),
            command_line,
        })
    }

    /// Surfaces an unexpected exit of the server as a distinct failure so
    /// it is not misread as a chain of step timeouts.
    pub fn check_alive(&mut self) -> Result<()> {
        if let Some(child) = &mut self.child {
            if let Some(status) = child.try_wait()? {
                self.child = None;
                return Err(HarnessError::UnexpectedExit { status }.into());
            }
        }
        Ok(())
    }

    /// Requests termination and waits for the process to exit. Calling
    /// this after the process has already exited is not an error.
    pub async fn stop(&mut self) -> Result<Option<ExitStatus>> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };

        if let Some(pid) = child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(nix::Error::ESRCH) => {}
                Err(e) => warn!("failed to send SIGTERM to server: {e}"),
            }
        }

        let status = child.wait().await?;
        info!(command = %self.command_line, %status, "server stopped");
        Ok(Some(status))
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(child) = &self.child {
            if let Some(pid) = child.id() {
                warn!(pid, "server still running at teardown, killing");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }
    }
}

/// Suite-level bracket around one server run: binds the readiness
/// endpoint, launches the server, waits for the startup datagram, and
/// guarantees termination when dropped or shut down.
pub struct ServerHarness {
    config: TestRunConfig,
    process: ServerProcess,
    run_dir: TempDir,
    ready_payload: Bytes,
}

impl ServerHarness {
    pub async fn start(config: TestRunConfig) -> Result<Self> {
        let run_dir = TempDir::new()?;
        let pid_file = run_dir.path().join(format!("{}.pid", std::process::id()));

        let channel = ReadinessChannel::bind()?;
        let mut process = ServerProcess::spawn(&config, channel.socket_path(), &pid_file)?;

        let ready_payload = match channel.await_ready(READINESS_WAIT).await {
            Ok(payload) => payload,
            Err(wait_err) => {
                // Distinguish "server died" from "server hung".
                if let Err(exit_err) = process.check_alive() {
                    return Err(exit_err);
                }
                return Err(wait_err);
            }
        };

        if ready_payload != READY_PAYLOAD {
            warn!(payload = ?ready_payload, "unexpected readiness payload");
        }

        Ok(Self {
            config,
            process,
            run_dir,
            ready_payload,
        })
    }

    /// The datagram the server sent at startup; conforming servers send
    /// exactly `READY=1`.
    pub fn ready_payload(&self) -> &[u8] {
        &self.ready_payload
    }

    pub fn config(&self) -> &TestRunConfig {
        &self.config
    }

    /// Directory holding the server's pid file for this run.
    pub fn run_path(&self) -> &Path {
        self.run_dir.path()
    }

    /// Runs one scenario, verifying the server is alive on either side so
    /// a crash shows up as a crash rather than as step timeouts.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<()> {
        self.process.check_alive()?;
        let mut runner = ScenarioRunner::new(&self.config);
        let outcome = runner.run(scenario).await;
        if outcome.is_err() {
            // A dead server explains the step failure better than the
            // step's own error does.
            self.process.check_alive()?;
        }
        outcome
    }

    pub async fn shutdown(mut self) -> Result<Option<ExitStatus>> {
        self.process.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn script_config(dir: &TempDir, script: &str) -> TestRunConfig {
        // `sh -f <file> -P <pid>` runs <file> as a script with `-P <pid>`
        // as its positional arguments, which makes a stock shell stand in
        // for the server binary.
        let path = dir.path().join("fake-server.conf");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{script}").unwrap();
        TestRunConfig::new("/bin/sh", path, 5060)
    }

    #[tokio::test]
    async fn spawn_failure_is_a_setup_error() {
        let config = TestRunConfig::new("/nonexistent/server-binary", "t/basic.conf", 5060);
        let err = ServerProcess::spawn(&config, Path::new("/tmp/notify.sock"), Path::new("/tmp/x.pid"))
            .err()
            .expect("spawn must fail");
        let harness_err = err.downcast::<HarnessError>().unwrap();
        assert!(matches!(harness_err, HarnessError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn stop_terminates_a_running_server() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let config = script_config(&dir, "exec /bin/sleep 5");
        let mut process =
            ServerProcess::spawn(&config, Path::new("/tmp/notify.sock"), &dir.path().join("x.pid"))?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        process.check_alive()?;

        let status = process.stop().await?;
        assert!(status.is_some());

        // Stopping again is a no-op, not an error.
        assert!(process.stop().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn early_exit_is_reported_distinctly() -> crate::Result<()> {
        let dir = TempDir::new()?;
        let config = script_config(&dir, "exit 3");
        let mut process =
            ServerProcess::spawn(&config, Path::new("/tmp/notify.sock"), &dir.path().join("x.pid"))?;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let err = process.check_alive().unwrap_err();
        let harness_err = err.downcast::<HarnessError>()?;
        match harness_err {
            HarnessError::UnexpectedExit { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }
}
