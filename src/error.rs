use std::{
  error::Error,
  fmt::{Debug, Display},
};

use flexi_logger::FlexiLoggerError;
use nix::errno::Errno;

pub enum JudgeError {
  Decode(String),
  Launch(String),
  Nix(Errno),
  Io(String),
  Json(String),
  Logger(FlexiLoggerError),
}

impl JudgeError {
  pub fn decode<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Decode(msg.into())
  }

  pub fn launch<MS: Into<String>>(msg: MS) -> JudgeError {
    JudgeError::Launch(msg.into())
  }

  /// Message without the kind prefix
  pub fn detail(&self) -> String {
    match &self {
      JudgeError::Decode(msg) => msg.clone(),
      JudgeError::Launch(msg) => msg.clone(),
      JudgeError::Nix(errno) => errno.to_string(),
      JudgeError::Io(msg) => msg.clone(),
      JudgeError::Json(msg) => msg.clone(),
      JudgeError::Logger(err) => err.to_string(),
    }
  }
}

impl Debug for JudgeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for JudgeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      JudgeError::Decode(msg) => f.write_fmt(format_args!("Judge Input Error: {}", msg)),
      JudgeError::Launch(msg) => f.write_fmt(format_args!("Judge System Error: {}", msg)),
      JudgeError::Nix(errno) => f.write_fmt(format_args!("Judge System Error: {}", errno)),
      JudgeError::Io(msg) => f.write_fmt(format_args!("Judge System Error: {}", msg)),
      JudgeError::Json(msg) => f.write_fmt(format_args!("Judge Output Error: {}", msg)),
      JudgeError::Logger(err) => f.write_fmt(format_args!("Judge Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for JudgeError {
  fn from(errno: Errno) -> Self {
    JudgeError::Nix(errno)
  }
}

impl From<std::io::Error> for JudgeError {
  fn from(err: std::io::Error) -> Self {
    JudgeError::Io(err.to_string())
  }
}

impl From<serde_json::Error> for JudgeError {
  fn from(err: serde_json::Error) -> Self {
    JudgeError::Json(err.to_string())
  }
}

impl From<FlexiLoggerError> for JudgeError {
  fn from(err: FlexiLoggerError) -> Self {
    JudgeError::Logger(err)
  }
}

impl Error for JudgeError {}
