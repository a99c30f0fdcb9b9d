//! Syntax-only check of a submission, without running it.

use std::process::Command;

use log::{debug, info};

use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::sandbox::{run_process, watchdog, CancelToken, ProcessControl, ProcessOutcome};

const SYNTAX_CHECK: &str = include_str!("syntax_check.py");

const EXIT_SYNTAX_ERROR: i32 = 2;

const EXIT_FRONTEND_ERROR: i32 = 3;

/// Why a submission does not compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileFailure {
  /// Grammar-level failure, carries the formatted trace
  Syntax(String),
  /// Any other compiler frontend failure, carries the raw text
  Frontend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
  Passed,
  Rejected(CompileFailure),
  Cancelled,
}

impl CompileFailure {
  pub fn message(&self) -> &str {
    match self {
      CompileFailure::Syntax(trace) => trace,
      CompileFailure::Frontend(text) => text,
    }
  }
}

pub struct Validator<'a> {
  config: &'a JudgeConfig,
  control: &'a dyn ProcessControl,
  token: &'a CancelToken,
}

impl<'a> Validator<'a> {
  pub fn new(config: &'a JudgeConfig, control: &'a dyn ProcessControl, token: &'a CancelToken) -> Self {
    Validator {
      config,
      control,
      token,
    }
  }

  pub fn validate(&self, source: &str) -> Result<Validation, JudgeError> {
    let script = watchdog::guard(SYNTAX_CHECK);
    let mut command = Command::new(self.config.get_python());
    command
      .arg("-c")
      .arg(script)
      .env("PYTHONIOENCODING", "utf-8");

    let limit = self.config.get_compile_time_limit();
    let outcome = run_process(&mut command, source, limit, self.token, self.control, self.config)?;

    let validation = match outcome {
      ProcessOutcome::Exited {
        status,
        stdout,
        stderr,
        ..
      } => match status.code() {
        Some(0) => Validation::Passed,
        Some(EXIT_SYNTAX_ERROR) => Validation::Rejected(CompileFailure::Syntax(stdout)),
        Some(EXIT_FRONTEND_ERROR) => Validation::Rejected(CompileFailure::Frontend(stdout)),
        _ => {
          debug!("Syntax check exits abnormally with {}", status);
          let text = if stderr.trim().is_empty() { stdout } else { stderr };
          Validation::Rejected(CompileFailure::Frontend(text))
        }
      },
      ProcessOutcome::TimedOut { .. } => Validation::Rejected(CompileFailure::Frontend(format!(
        "Syntax check exceeded time limit ({} ms).",
        limit.as_millis()
      ))),
      ProcessOutcome::Cancelled => Validation::Cancelled,
    };

    match &validation {
      Validation::Passed => info!("Syntax check passed"),
      Validation::Rejected(CompileFailure::Syntax(_)) => info!("Syntax check fails: syntax error"),
      Validation::Rejected(CompileFailure::Frontend(_)) => info!("Syntax check fails: frontend error"),
      Validation::Cancelled => info!("Syntax check is cancelled"),
    }
    Ok(validation)
  }
}
