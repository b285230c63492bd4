//! Optional Maven build run before linting so `target/classes` and
//! `target/dependency` exist.

use crate::error::{LintError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_GOALS: [&str; 3] = ["clean", "package", "dependency:copy-dependencies"];
pub const BATCH_FLAGS: [&str; 3] = ["-B", "-q", "-DskipTests"];
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Build settings as configured, before a project root is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub executable: Option<String>,
    pub add_goals: Vec<String>,
    pub remove_goals: Vec<String>,
    pub timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            executable: None,
            add_goals: Vec::new(),
            remove_goals: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenBuild {
    pub executable: PathBuf,
    pub goals: Vec<String>,
    pub timeout: Duration,
}

impl MavenBuild {
    /// Build for `project_root`: the Maven wrapper when the project ships
    /// one, `mvn` from `PATH` otherwise, unless `executable` is given.
    pub fn new(
        project_root: &Path,
        executable: Option<&str>,
        add: &[String],
        remove: &[String],
        timeout: Duration,
    ) -> Self {
        let executable = match executable {
            Some(e) => PathBuf::from(e),
            None => find_executable(project_root),
        };
        Self {
            executable,
            goals: resolve_goals(add, remove),
            timeout,
        }
    }

    pub fn from_options(project_root: &Path, opts: &BuildOptions) -> Self {
        Self::new(
            project_root,
            opts.executable.as_deref(),
            &opts.add_goals,
            &opts.remove_goals,
            opts.timeout,
        )
    }

    /// Arguments passed to the executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.goals.clone();
        args.extend(BATCH_FLAGS.iter().map(|s| s.to_string()));
        args
    }

    /// Run the build in `project_root`, killing it when the timeout passes.
    pub fn run(&self, project_root: &Path) -> Result<()> {
        if self.goals.is_empty() {
            warn!("no Maven goals left after add/remove; build skipped");
            return Ok(());
        }
        info!(
            executable = %self.executable.display(),
            goals = ?self.goals,
            "running Maven build"
        );
        let mut child = Command::new(&self.executable)
            .args(self.args())
            .current_dir(project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| {
                LintError::Build(format!(
                    "could not start '{}': {}",
                    self.executable.display(),
                    e
                ))
            })?;
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(elapsed_ms, "Maven build finished");
                    return Ok(());
                }
                Ok(Some(status)) => {
                    return Err(LintError::Build(format!(
                        "'{}' exited with code {}",
                        self.executable.display(),
                        status.code().unwrap_or(-1)
                    )))
                }
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LintError::Build(format!(
                        "build did not finish within {}s",
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(LintError::Build(format!("waiting for build: {}", e))),
            }
        }
    }
}

/// Default goals plus `add`, minus `remove`, without duplicates.
pub fn resolve_goals(add: &[String], remove: &[String]) -> Vec<String> {
    let mut goals: Vec<String> = DEFAULT_GOALS.iter().map(|s| s.to_string()).collect();
    for g in add {
        let g = g.trim();
        if !g.is_empty() && !goals.iter().any(|x| x == g) {
            goals.push(g.to_string());
        }
    }
    goals.retain(|g| !remove.iter().any(|r| r.trim() == g));
    goals
}

pub fn find_executable(project_root: &Path) -> PathBuf {
    let wrapper = if cfg!(windows) { "mvnw.cmd" } else { "mvnw" };
    let candidate = project_root.join(wrapper);
    if candidate.is_file() {
        candidate
    } else {
        PathBuf::from(if cfg!(windows) { "mvn.cmd" } else { "mvn" })
    }
}
