//! The supervised browser subprocess: a thin wrapper around
//! `tokio::process::Child` that owns the child's lifetime while handing its
//! stdin/stdout halves off to the transport.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::LaunchConfig;
use crate::error::{CdpError, Result};

/// An OS handle to the running browser. Its stdin/stdout halves are handed
/// back separately from `spawn` for the transport to own; stderr is either
/// discarded or forwarded to the logger per `discard_stderr`.
pub struct BrowserProcess {
    child: Child,
}

impl BrowserProcess {
    /// Spawns the browser with the DevTools pipe enabled, keeping stdin and
    /// stdout piped so they can serve as the DevTools transport.
    pub async fn spawn(
        executable: &Path,
        user_data_dir: &Path,
        config: &LaunchConfig,
    ) -> Result<(Self, ChildStdin, ChildStdout)> {
        let mut cmd = Command::new(executable);
        cmd.args(launch_args(user_data_dir, config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(CdpError::SpawnFailed)?;
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        if config.discard_stderr {
            drop(stderr);
        } else {
            spawn_stderr_forwarder(stderr);
        }

        Ok((Self { child }, stdin, stdout))
    }

    /// Waits for the subprocess; if it has not exited within `grace` the
    /// process is killed outright. The caller (`Transport::stop`) is
    /// responsible for dropping its `ChildStdin` first to signal
    /// end-of-input — `stdin` was already taken out of `child` in `spawn`,
    /// so there's nothing left here to close.
    pub async fn stop(mut self, grace: std::time::Duration) -> std::io::Result<()> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status.map(|_| ()),
            Err(_) => self.child.kill().await,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

fn spawn_stderr_forwarder(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::warn!(target: "chromedrive_core::browser_stderr", "{line}");
        }
    });
}

fn launch_args(user_data_dir: &Path, config: &LaunchConfig) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-pipe".to_string(),
        "--headless".to_string(),
        "--disable-gpu".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--user-data-dir={}", user_data_dir.display()),
    ];
    if config.no_sandbox {
        args.push("--no-sandbox".to_string());
    }
    args.extend(config.chrome_args.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_include_required_flags() {
        let cfg = LaunchConfig::default();
        let args = launch_args(Path::new("/tmp/profile-1"), &cfg);
        assert!(args.contains(&"--remote-debugging-pipe".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
        assert!(!args.contains(&"--no-sandbox".to_string()));
    }

    #[test]
    fn no_sandbox_flag_is_conditional() {
        let mut cfg = LaunchConfig::default();
        cfg.no_sandbox = true;
        let args = launch_args(Path::new("/tmp/profile-2"), &cfg);
        assert!(args.contains(&"--no-sandbox".to_string()));
    }
}
