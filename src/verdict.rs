use std::io::Write;

use log::info;
use serde::{Serialize, Serializer};

use crate::error::JudgeError;
use crate::request::EvaluationRequest;
use crate::sandbox::ExecutionOutcome;
use crate::validator::CompileFailure;

pub const TIME_LIMIT_MESSAGE: &str = "Execution exceeded time limit.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
  #[serde(rename = "Accepted (AC)")]
  Accepted,
  #[serde(rename = "Wrong Answer (WA)")]
  WrongAnswer,
  #[serde(rename = "Time Limit Exceeded (TLE)")]
  TimeLimitExceeded,
  #[serde(rename = "Runtime Error (RE)")]
  RuntimeError,
  #[serde(rename = "Compile Error (CE)")]
  CompileError,
}

impl Status {
  pub fn code(&self) -> &'static str {
    match self {
      Status::Accepted => "AC",
      Status::WrongAnswer => "WA",
      Status::TimeLimitExceeded => "TLE",
      Status::RuntimeError => "RE",
      Status::CompileError => "CE",
    }
  }
}

/// Final response of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
  pub status: Status,
  pub user_code: String,
  pub expected_output: String,
  #[serde(rename = "execution_time", serialize_with = "serialize_time")]
  pub execution_time_ms: f64,
  pub error_message: String,
  pub user_output: String,
  pub input_test_case: String,
}

fn serialize_time<S: Serializer>(ms: &f64, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_str(&format_time(*ms))
}

pub fn format_time(ms: f64) -> String {
  format!("{:.2}ms", ms)
}

impl Verdict {
  fn new(status: Status, request: &EvaluationRequest, execution_time_ms: f64) -> Self {
    Verdict {
      status,
      user_code: request.source_code.clone(),
      expected_output: request.expected_output.clone(),
      execution_time_ms,
      error_message: String::new(),
      user_output: String::new(),
      input_test_case: request.input.clone(),
    }
  }

  fn message<MS: Into<String>>(mut self, message: MS) -> Self {
    self.error_message = message.into();
    self
  }

  fn output<OS: Into<String>>(mut self, output: OS) -> Self {
    self.user_output = output.into();
    self
  }

  /// Payload could not be decoded, nothing but the input is echoed
  pub fn decode_error(error: &JudgeError, input: &str) -> Self {
    Verdict {
      status: Status::RuntimeError,
      user_code: String::new(),
      expected_output: String::new(),
      execution_time_ms: 0.0,
      error_message: error.to_string(),
      user_output: String::new(),
      input_test_case: input.to_string(),
    }
  }

  /// Compile errors never measure wall time
  pub fn compile_error(failure: &CompileFailure, request: &EvaluationRequest) -> Self {
    Verdict::new(Status::CompileError, request, 0.0).message(failure.message())
  }

  pub fn system_error(reason: &str, request: &EvaluationRequest) -> Self {
    Verdict::new(Status::RuntimeError, request, 0.0).message(format!("Judge System Error: {}", reason))
  }

  /// Map an execution outcome to a verdict, `None` when cancelled
  pub fn classify(outcome: ExecutionOutcome, request: &EvaluationRequest) -> Option<Self> {
    let verdict = match outcome {
      ExecutionOutcome::Cancelled => return None,
      ExecutionOutcome::LaunchFailed { reason } => Verdict::system_error(&reason, request),
      ExecutionOutcome::TimedOut { wall_time_ms } => {
        Verdict::new(Status::TimeLimitExceeded, request, wall_time_ms).message(TIME_LIMIT_MESSAGE)
      }
      ExecutionOutcome::Completed {
        exit_code,
        stdout,
        stderr,
        wall_time_ms,
      } => {
        let user_output = stdout.trim().to_string();
        let expected = request.expected_output.trim();
        if exit_code != 0 {
          Verdict::new(Status::RuntimeError, request, wall_time_ms)
            .message(stderr)
            .output(user_output)
        } else if user_output == expected {
          Verdict::new(Status::Accepted, request, wall_time_ms).output(user_output)
        } else {
          let message = format!(
            "Output Mismatch.\nYour Output:\n{}\nExpected:\n{}",
            user_output, expected
          );
          Verdict::new(Status::WrongAnswer, request, wall_time_ms)
            .message(message)
            .output(user_output)
        }
      }
    };
    Some(verdict)
  }

  pub fn to_json(&self) -> Result<String, JudgeError> {
    Ok(serde_json::to_string(self)?)
  }

  /// Write the verdict as a single line
  pub fn emit<W: Write>(&self, writer: &mut W) -> Result<(), JudgeError> {
    let line = self.to_json()?;
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    info!(
      "Emit verdict {} ({})",
      self.status.code(),
      format_time(self.execution_time_ms)
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::Value;

  use super::*;

  fn completed(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionOutcome {
    ExecutionOutcome::Completed {
      exit_code,
      stdout: stdout.to_string(),
      stderr: stderr.to_string(),
      wall_time_ms: 12.345,
    }
  }

  #[test]
  fn it_should_accept_trimmed_output() {
    let request = EvaluationRequest::new("print(1+1)").expected_output("  2\n");
    let verdict = Verdict::classify(completed(0, "2", ""), &request).unwrap();
    assert_eq!(verdict.status, Status::Accepted);
    assert_eq!(verdict.user_output, "2");
    assert_eq!(verdict.error_message, "");
  }

  #[test]
  fn it_should_keep_internal_whitespace() {
    let request = EvaluationRequest::new("").expected_output("1 2");
    let verdict = Verdict::classify(completed(0, "1  2", ""), &request).unwrap();
    assert_eq!(verdict.status, Status::WrongAnswer);

    let request = EvaluationRequest::new("").expected_output("Yes");
    let verdict = Verdict::classify(completed(0, "yes", ""), &request).unwrap();
    assert_eq!(verdict.status, Status::WrongAnswer);
  }

  #[test]
  fn it_should_report_both_outputs_on_wrong_answer() {
    let request = EvaluationRequest::new("print('hi')").expected_output("bye\n");
    let verdict = Verdict::classify(completed(0, "hi", ""), &request).unwrap();
    assert_eq!(verdict.status, Status::WrongAnswer);
    assert_eq!(
      verdict.error_message,
      "Output Mismatch.\nYour Output:\nhi\nExpected:\nbye"
    );
    assert_eq!(verdict.user_output, "hi");
  }

  #[test]
  fn it_should_keep_output_on_runtime_error() {
    let request = EvaluationRequest::new("").expected_output("2");
    let verdict = Verdict::classify(completed(1, "partial", "Exception: boom\n"), &request).unwrap();
    assert_eq!(verdict.status, Status::RuntimeError);
    assert_eq!(verdict.error_message, "Exception: boom\n");
    assert_eq!(verdict.user_output, "partial");
  }

  #[test]
  fn it_should_report_time_limit() {
    let request = EvaluationRequest::new("while True: pass").time_limit(1.0);
    let outcome = ExecutionOutcome::TimedOut {
      wall_time_ms: request.time_limit_ms(),
    };
    let verdict = Verdict::classify(outcome, &request).unwrap();
    assert_eq!(verdict.status, Status::TimeLimitExceeded);
    assert_eq!(verdict.error_message, TIME_LIMIT_MESSAGE);
    assert_eq!(verdict.user_output, "");
    assert_eq!(format_time(verdict.execution_time_ms), "1000.00ms");
  }

  #[test]
  fn it_should_report_launch_failure() {
    let request = EvaluationRequest::new("print(1)");
    let outcome = ExecutionOutcome::LaunchFailed {
      reason: "No such file or directory".to_string(),
    };
    let verdict = Verdict::classify(outcome, &request).unwrap();
    assert_eq!(verdict.status, Status::RuntimeError);
    assert_eq!(
      verdict.error_message,
      "Judge System Error: No such file or directory"
    );
  }

  #[test]
  fn it_should_skip_cancelled() {
    let request = EvaluationRequest::new("print(1)");
    assert!(Verdict::classify(ExecutionOutcome::Cancelled, &request).is_none());
  }

  #[test]
  fn it_should_serialize_response_fields() {
    let request = EvaluationRequest::new("x ==").input("1").expected_output("2");
    let failure = CompileFailure::Syntax("SyntaxError: invalid syntax".to_string());
    let verdict = Verdict::compile_error(&failure, &request);

    let line = verdict.to_json().unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["status"], "Compile Error (CE)");
    assert_eq!(value["user_code"], "x ==");
    assert_eq!(value["expected_output"], "2");
    assert_eq!(value["execution_time"], "0.00ms");
    assert_eq!(value["error_message"], "SyntaxError: invalid syntax");
    assert_eq!(value["user_output"], "");
    assert_eq!(value["input_test_case"], "1");

    let keys = value.as_object().unwrap().keys().cloned().collect::<Vec<String>>();
    assert_eq!(keys.len(), 7);
    assert!(line.starts_with("{\"status\":"));
  }

  #[test]
  fn it_should_emit_one_line() {
    let error = JudgeError::decode("expected value at line 1 column 1");
    let verdict = Verdict::decode_error(&error, "");
    let mut buf = vec![];
    verdict.emit(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.ends_with('\n'));
    assert!(text.contains("\"Runtime Error (RE)\""));
    assert!(text.contains("Judge Input Error: expected value"));
  }

  #[test]
  fn it_should_format_two_decimals() {
    assert_eq!(format_time(0.0), "0.00ms");
    assert_eq!(format_time(12.345678), "12.35ms");
  }
}
