//! Parent-liveness guard prepended to every Python program the judge starts.
//!
//! If the judge is killed before it reaches its cleanup path, the guard thread
//! notices within one interval and exits the child, so user code never keeps
//! running as an orphan.

use std::time::Duration;

use lazy_static::lazy_static;
use nix::unistd::{getpid, Pid};

/// Poll interval of the guard thread
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(500);

const TEMPLATE: &str = include_str!("watchdog.py");

lazy_static! {
  /// Preamble bound to the current judge process
  pub static ref WATCHDOG_PREAMBLE: String = render(getpid(), WATCHDOG_INTERVAL);
}

pub fn render(judge_pid: Pid, interval: Duration) -> String {
  TEMPLATE
    .replace("__JUDGE_PID__", &judge_pid.as_raw().to_string())
    .replace("__INTERVAL__", &format!("{}", interval.as_secs_f64()))
}

/// Prepend the preamble to `source`
pub fn guard(source: &str) -> String {
  format!("{}\n{}", WATCHDOG_PREAMBLE.as_str(), source)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_bind_pid_and_interval() {
    let text = render(Pid::from_raw(4242), Duration::from_millis(500));
    assert!(text.contains("args=(4242, 0.5)"));
    assert!(!text.contains("__JUDGE_PID__"));
    assert!(!text.contains("__INTERVAL__"));
  }

  #[test]
  fn it_should_keep_source_after_preamble() {
    let program = guard("print(1+1)");
    assert!(program.starts_with(WATCHDOG_PREAMBLE.as_str()));
    assert!(program.ends_with("\nprint(1+1)"));
    assert!(program.contains(&format!("args=({}, 0.5)", getpid())));
  }
}
