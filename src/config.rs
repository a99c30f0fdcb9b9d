use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::sandbox::KillStrategy;

pub const DEFAULT_PYTHON: &str = "python3";

/// Deployment-level judge options
#[derive(Debug, Clone)]
pub struct JudgeConfig {
  python: String,
  workdir: Option<PathBuf>,
  compile_time_limit: Duration,
  kill_strategy: KillStrategy,
  reap_timeout: Duration,
  drain_timeout: Duration,
}

impl JudgeConfig {
  pub fn new() -> Self {
    JudgeConfig {
      python: env::var("JUDGEBOX_PYTHON").unwrap_or(DEFAULT_PYTHON.to_string()),
      workdir: None,
      compile_time_limit: Duration::from_secs(10),
      kill_strategy: KillStrategy::Group,
      reap_timeout: Duration::from_millis(200),
      drain_timeout: Duration::from_secs(2),
    }
  }

  /// Set the interpreter used to check and run submissions
  pub fn python<PS: Into<String>>(self: &mut Self, program: PS) -> &mut Self {
    self.python = program.into();
    self
  }

  /// Set the directory holding the temporary source file
  pub fn workdir<PP: Into<PathBuf>>(self: &mut Self, path: Option<PP>) -> &mut Self {
    self.workdir = path.map(|p| p.into());
    self
  }

  /// Set syntax check time limit (unit: ms)
  pub fn compile_time_limit(self: &mut Self, value: u64) -> &mut Self {
    self.compile_time_limit = Duration::from_millis(value);
    self
  }

  pub fn kill_strategy(self: &mut Self, strategy: KillStrategy) -> &mut Self {
    self.kill_strategy = strategy;
    self
  }

  pub fn reap_timeout(self: &mut Self, value: Duration) -> &mut Self {
    self.reap_timeout = value;
    self
  }

  pub fn drain_timeout(self: &mut Self, value: Duration) -> &mut Self {
    self.drain_timeout = value;
    self
  }

  pub fn get_python(&self) -> &str {
    &self.python
  }

  pub fn get_workdir(&self) -> PathBuf {
    self.workdir.clone().unwrap_or_else(env::temp_dir)
  }

  pub fn get_compile_time_limit(&self) -> Duration {
    self.compile_time_limit
  }

  pub fn get_kill_strategy(&self) -> KillStrategy {
    self.kill_strategy
  }

  pub fn get_reap_timeout(&self) -> Duration {
    self.reap_timeout
  }

  pub fn get_drain_timeout(&self) -> Duration {
    self.drain_timeout
  }
}

impl Default for JudgeConfig {
  fn default() -> Self {
    Self::new()
  }
}
