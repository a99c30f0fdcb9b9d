use log::{info, warn};

use crate::config::JudgeConfig;
use crate::request::EvaluationRequest;
use crate::sandbox::{select, CancelToken, ExecutionOutcome, Executor, ProcessControl};
use crate::validator::{Validation, Validator};
use crate::verdict::Verdict;

/// What the judge ends up with for one request
#[derive(Debug, Clone, PartialEq)]
pub enum JudgeOutcome {
  Verdict(Verdict),
  /// Aborted from outside, no response should be written
  Cancelled,
}

/// Validator, executor and classifier chained for one submission
pub struct Judge {
  config: JudgeConfig,
  control: Box<dyn ProcessControl>,
  token: CancelToken,
}

impl Judge {
  pub fn new(config: JudgeConfig, token: CancelToken) -> Self {
    let control = select(config.get_kill_strategy());
    Judge {
      config,
      control,
      token,
    }
  }

  pub fn token(&self) -> &CancelToken {
    &self.token
  }

  pub fn evaluate(&self, request: &EvaluationRequest) -> JudgeOutcome {
    let validator = Validator::new(&self.config, self.control.as_ref(), &self.token);
    match validator.validate(&request.source_code) {
      Ok(Validation::Passed) => {}
      Ok(Validation::Rejected(failure)) => {
        return self.finish(Verdict::compile_error(&failure, request));
      }
      Ok(Validation::Cancelled) => return JudgeOutcome::Cancelled,
      Err(err) => {
        warn!("Syntax check can not run: {}", err);
        return self.finish(Verdict::system_error(&err.detail(), request));
      }
    }

    if self.token.is_cancelled() {
      return JudgeOutcome::Cancelled;
    }

    let executor = Executor::new(&self.config, self.control.as_ref(), &self.token);
    let outcome = executor.execute(request);
    if outcome == ExecutionOutcome::Cancelled {
      return JudgeOutcome::Cancelled;
    }

    match Verdict::classify(outcome, request) {
      Some(verdict) => self.finish(verdict),
      None => JudgeOutcome::Cancelled,
    }
  }

  /// Cancellation wins over a verdict that is ready but not yet written
  fn finish(&self, verdict: Verdict) -> JudgeOutcome {
    if self.token.is_cancelled() {
      info!("Drop verdict {} after cancellation", verdict.status.code());
      JudgeOutcome::Cancelled
    } else {
      JudgeOutcome::Verdict(verdict)
    }
  }
}
