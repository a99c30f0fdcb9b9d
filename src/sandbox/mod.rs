pub use cancel::CancelToken;
pub use executor::{ExecutionOutcome, Executor};
pub use platform::{select, KillStrategy, ProcessControl, ProcessGroupControl, SingleProcessControl};
pub use process::{run_process, ProcessOutcome};

mod cancel;
mod executor;
mod platform;
mod process;
pub mod watchdog;
