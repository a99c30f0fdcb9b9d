use std::fmt::{Display, Formatter};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};

use log::{debug, error, info};
use tempfile::{Builder, TempPath};

use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::request::EvaluationRequest;
use crate::sandbox::cancel::CancelToken;
use crate::sandbox::platform::ProcessControl;
use crate::sandbox::process::{run_process, ProcessOutcome};
use crate::sandbox::watchdog;

/// Result of running one submission
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
  Completed {
    exit_code: i32,
    stdout: String,
    stderr: String,
    wall_time_ms: f64,
  },
  TimedOut {
    wall_time_ms: f64,
  },
  Cancelled,
  LaunchFailed {
    reason: String,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutorState {
  Idle,
  Prepared,
  Running,
  Finished,
  Cleaned,
}

impl Display for ExecutorState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      ExecutorState::Idle => "idle",
      ExecutorState::Prepared => "prepared",
      ExecutorState::Running => "running",
      ExecutorState::Finished => "finished",
      ExecutorState::Cleaned => "cleaned",
    };
    f.write_str(name)
  }
}

/// Runs one submission in the sandbox
pub struct Executor<'a> {
  config: &'a JudgeConfig,
  control: &'a dyn ProcessControl,
  token: &'a CancelToken,
  state: ExecutorState,
}

impl<'a> Executor<'a> {
  pub fn new(config: &'a JudgeConfig, control: &'a dyn ProcessControl, token: &'a CancelToken) -> Self {
    Executor {
      config,
      control,
      token,
      state: ExecutorState::Idle,
    }
  }

  fn transition(&mut self, state: ExecutorState) {
    debug!("Executor {} -> {}", self.state, state);
    self.state = state;
  }

  /// Write the guarded program to a fresh temporary file
  fn prepare(&self, source: &str) -> Result<TempPath, JudgeError> {
    let workdir = self.config.get_workdir();
    let mut file = Builder::new()
      .prefix("judgebox-")
      .suffix(".py")
      .tempfile_in(&workdir)
      .map_err(|err| {
        JudgeError::launch(format!(
          "can not create temporary file in {}: {}",
          workdir.to_string_lossy(),
          err
        ))
      })?;
    file.write_all(watchdog::guard(source).as_bytes())?;
    file.flush()?;
    let path = file.into_temp_path();
    debug!("Write submission to {}", path.to_string_lossy());
    Ok(path)
  }

  fn run(&mut self, path: &TempPath, request: &EvaluationRequest) -> Result<ExecutionOutcome, JudgeError> {
    let mut command = Command::new(self.config.get_python());
    command.arg(path.as_os_str()).env("PYTHONIOENCODING", "utf-8");

    self.transition(ExecutorState::Running);
    let outcome = run_process(
      &mut command,
      &request.input,
      request.time_limit_duration(),
      self.token,
      self.control,
      self.config,
    )?;

    Ok(match outcome {
      ProcessOutcome::Exited {
        status,
        stdout,
        stderr,
        elapsed,
      } => ExecutionOutcome::Completed {
        exit_code: exit_code(status),
        stdout: stdout.trim().to_string(),
        stderr,
        wall_time_ms: elapsed.as_secs_f64() * 1000.0,
      },
      ProcessOutcome::TimedOut { .. } => ExecutionOutcome::TimedOut {
        wall_time_ms: request.time_limit_ms(),
      },
      ProcessOutcome::Cancelled => ExecutionOutcome::Cancelled,
    })
  }

  /// Run the submission and release every sandbox resource before returning
  pub fn execute(mut self, request: &EvaluationRequest) -> ExecutionOutcome {
    if self.token.is_cancelled() {
      return ExecutionOutcome::Cancelled;
    }

    let path = match self.prepare(&request.source_code) {
      Ok(path) => path,
      Err(err) => {
        error!("Prepare submission fails: {}", err);
        return ExecutionOutcome::LaunchFailed {
          reason: err.detail(),
        };
      }
    };
    self.transition(ExecutorState::Prepared);

    let outcome = match self.run(&path, request) {
      Ok(outcome) => outcome,
      Err(err) => {
        error!("Run submission fails: {}", err);
        ExecutionOutcome::LaunchFailed {
          reason: err.detail(),
        }
      }
    };
    self.transition(ExecutorState::Finished);

    let display = path.to_string_lossy().to_string();
    match path.close() {
      Ok(_) => debug!("Remove temporary file {}", display),
      Err(err) => error!("Fails removing temporary file {}: {}", display, err),
    }
    self.transition(ExecutorState::Cleaned);

    info!("Execution outcome: {}", outcome.kind());
    outcome
  }
}

impl ExecutionOutcome {
  pub fn kind(&self) -> &'static str {
    match self {
      ExecutionOutcome::Completed { .. } => "completed",
      ExecutionOutcome::TimedOut { .. } => "timed out",
      ExecutionOutcome::Cancelled => "cancelled",
      ExecutionOutcome::LaunchFailed { .. } => "launch failed",
    }
  }
}

/// Signalled children report the negated signal number
fn exit_code(status: ExitStatus) -> i32 {
  match status.code() {
    Some(code) => code,
    None => -status.signal().unwrap_or(0),
  }
}
