pub use config::JudgeConfig;
pub use error::JudgeError;
pub use judge::{Judge, JudgeOutcome};
pub use request::{DecodeFailure, EvaluationRequest};
pub use sandbox::{CancelToken, ExecutionOutcome, Executor, KillStrategy};
pub use validator::{CompileFailure, Validation, Validator};
pub use verdict::{Status, Verdict};

mod config;
mod error;
mod judge;
mod request;
pub mod sandbox;
mod validator;
mod verdict;
