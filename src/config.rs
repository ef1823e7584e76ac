use std::path::PathBuf;
use std::time::Duration;

/// Options consumed at browser-launch time.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Override auto-discovery of the Chrome/Chromium executable.
    pub chrome_executable: Option<PathBuf>,
    /// Extra launch flags appended after the required ones.
    pub chrome_args: Vec<String>,
    /// Add `--no-sandbox` to the launch command.
    pub no_sandbox: bool,
    /// Route browser stderr to /dev/null instead of the logger.
    pub discard_stderr: bool,
    /// Bootstrap emits `Network.emulateNetworkConditions(offline=true)`.
    pub offline: bool,
    /// Bootstrap emits `Security.setIgnoreCertificateErrors`.
    pub ignore_certificate_errors: bool,
    /// Deadline for the bootstrap protocol that registers a session.
    pub init_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            chrome_args: Vec::new(),
            no_sandbox: false,
            discard_stderr: true,
            offline: false,
            ignore_certificate_errors: false,
            init_timeout: Duration::from_secs(20),
        }
    }
}

/// Options consumed by the `SessionPool`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent Sessions. Defaults to the number of available
    /// parallelism units.
    pub size: usize,
    /// Protocols per Session before recycling.
    pub max_session_uses: usize,
    /// If true, the pool is empty at rest: `checkout` boots a fresh browser
    /// and `checkin` tears it down.
    pub on_demand: bool,
    /// Per-request protocol deadline.
    pub timeout: Duration,
    /// How long `checkout` waits for an idle Session before failing with
    /// `PoolExhausted`. Zero means fail immediately if nothing is idle.
    pub checkout_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_session_uses: 1000,
            on_demand: false,
            timeout: Duration::from_secs(30),
            checkout_timeout: Duration::ZERO,
        }
    }
}

/// Returns the path to Chrome's executable.
///
/// If the `CHROME` environment variable is set and points at an existing
/// file, it wins. Otherwise common binary names are searched for on `PATH`,
/// then a couple of well-known platform install locations.
pub fn default_executable() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var("CHROME") {
        if std::path::Path::new(&path).exists() {
            return Ok(path.into());
        }
    }

    for app in &[
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "chrome-browser",
    ] {
        if let Ok(path) = which::which(app) {
            return Ok(dunce::canonicalize(path).map_err(|e| e.to_string())?);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let default_paths = &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"][..];
        for path in default_paths {
            if std::path::Path::new(path).exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = windows_registry::chrome_path() {
            if path.exists() {
                return Ok(path);
            }
        }
    }

    Err("could not auto-detect a chrome/chromium executable".to_string())
}

#[cfg(windows)]
mod windows_registry {
    use std::path::PathBuf;

    pub fn chrome_path() -> Option<PathBuf> {
        let hkcu = winreg::RegKey::predef(winreg::enums::HKEY_CURRENT_USER);
        let hklm = winreg::RegKey::predef(winreg::enums::HKEY_LOCAL_MACHINE);
        for key in [
            hkcu.open_subkey(r"Software\Clients\StartMenuInternet\Google Chrome\shell\open\command"),
            hklm.open_subkey(r"Software\Clients\StartMenuInternet\Google Chrome\shell\open\command"),
        ] {
            if let Ok(key) = key {
                if let Ok(path) = key.get_value::<String, _>("") {
                    return Some(PathBuf::from(path.trim_matches('"')));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_defaults_match_spec() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.max_session_uses, 1000);
        assert!(!cfg.on_demand);
        assert!(cfg.size >= 1);
    }
}
