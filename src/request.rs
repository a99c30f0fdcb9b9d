use std::time::Duration;

use log::{debug, info};
use serde_json::{Map, Value};

use crate::error::JudgeError;

pub const DEFAULT_TIME_LIMIT: f64 = 2.0;

/// One submission to judge, built once from the transport payload
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
  pub source_code: String,
  pub input: String,
  pub expected_output: String,
  /// Time limit (unit: second)
  pub time_limit: f64,
}

/// Decoding failure, carrying whatever `input` could still be recovered
#[derive(Debug)]
pub struct DecodeFailure {
  pub error: JudgeError,
  pub input: String,
}

impl EvaluationRequest {
  pub fn new<S: Into<String>>(source_code: S) -> Self {
    EvaluationRequest {
      source_code: source_code.into(),
      input: String::new(),
      expected_output: String::new(),
      time_limit: DEFAULT_TIME_LIMIT,
    }
  }

  pub fn input<S: Into<String>>(mut self, input: S) -> Self {
    self.input = input.into();
    self
  }

  pub fn expected_output<S: Into<String>>(mut self, expected_output: S) -> Self {
    self.expected_output = expected_output.into();
    self
  }

  pub fn time_limit(mut self, seconds: f64) -> Self {
    self.time_limit = seconds;
    self
  }

  /// Saturates for limits too large to represent
  pub fn time_limit_duration(&self) -> Duration {
    Duration::try_from_secs_f64(self.time_limit).unwrap_or(Duration::MAX)
  }

  pub fn time_limit_ms(&self) -> f64 {
    self.time_limit * 1000.0
  }

  /// Parse the raw payload.
  ///
  /// Returns `Ok(None)` for an empty payload, there is nothing to judge.
  pub fn decode(raw: &str) -> Result<Option<Self>, DecodeFailure> {
    if raw.is_empty() {
      info!("Empty request payload, nothing to judge");
      return Ok(None);
    }

    let value: Value = serde_json::from_str(raw).map_err(|err| DecodeFailure {
      error: JudgeError::decode(err.to_string()),
      input: String::new(),
    })?;

    let object = match value.as_object() {
      Some(object) => object,
      None => {
        return Err(DecodeFailure {
          error: JudgeError::decode("request payload should be an object"),
          input: String::new(),
        })
      }
    };

    // Recover input first so that a later failure can still echo it
    let recovered = object
      .get("input")
      .and_then(|v| v.as_str())
      .unwrap_or("")
      .to_string();

    Self::from_object(object).map(Some).map_err(|error| DecodeFailure {
      error,
      input: recovered,
    })
  }

  fn from_object(object: &Map<String, Value>) -> Result<Self, JudgeError> {
    let request = EvaluationRequest {
      source_code: string_field(object, "source_code")?,
      input: string_field(object, "input")?,
      expected_output: string_field(object, "expected_output")?,
      time_limit: time_limit_field(object)?,
    };
    debug!(
      "Decoded request: {} bytes of source, {} bytes of input, time limit {}s",
      request.source_code.len(),
      request.input.len(),
      request.time_limit
    );
    Ok(request)
  }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Result<String, JudgeError> {
  match object.get(key) {
    None | Some(Value::Null) => Ok(String::new()),
    Some(Value::String(text)) => Ok(text.clone()),
    Some(other) => Err(JudgeError::decode(format!(
      "field \"{}\" should be a string, got {}",
      key, other
    ))),
  }
}

fn time_limit_field(object: &Map<String, Value>) -> Result<f64, JudgeError> {
  let seconds = match object.get("time_limit") {
    None | Some(Value::Null) => return Ok(DEFAULT_TIME_LIMIT),
    Some(Value::Number(number)) => number.as_f64(),
    Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
    Some(_) => None,
  };

  match seconds {
    Some(seconds) if seconds.is_finite() && seconds > 0.0 => Ok(seconds),
    Some(seconds) => Err(JudgeError::decode(format!(
      "time_limit should be a positive number of seconds, got {}",
      seconds
    ))),
    None => Err(JudgeError::decode(format!(
      "time_limit could not be converted to float: {}",
      object["time_limit"]
    ))),
  }
}
