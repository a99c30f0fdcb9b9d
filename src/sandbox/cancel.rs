use std::os::unix::prelude::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use log::{debug, info};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc;
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{close, pipe2};

use crate::error::JudgeError;

/// Token reached from the signal handler
static INSTALLED: OnceLock<CancelToken> = OnceLock::new();

/// External abort request shared between the signal path and the executor.
///
/// Cancelling only flips an atomic flag and writes one byte to a non-blocking
/// self-pipe, so it may be called from a signal handler. The read end stays
/// readable once cancelled, which makes every later wait return immediately.
#[derive(Clone)]
pub struct CancelToken {
  inner: Arc<CancelInner>,
}

struct CancelInner {
  cancelled: AtomicBool,
  read: RawFd,
  write: RawFd,
}

impl CancelToken {
  pub fn new() -> Result<Self, JudgeError> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
    Ok(CancelToken {
      inner: Arc::new(CancelInner {
        cancelled: AtomicBool::new(false),
        read,
        write,
      }),
    })
  }

  /// Route SIGTERM and SIGINT to this token, once per process
  pub fn install(&self) -> Result<(), JudgeError> {
    if INSTALLED.set(self.clone()).is_err() {
      return Err(JudgeError::launch("cancel signal handlers are already installed"));
    }

    let action = SigAction::new(
      SigHandler::Handler(handle_signal),
      SaFlags::SA_RESTART,
      SigSet::empty(),
    );
    unsafe {
      sigaction(Signal::SIGTERM, &action)?;
      sigaction(Signal::SIGINT, &action)?;
    }

    info!("Cancel signal handlers installed (SIGTERM, SIGINT)");
    Ok(())
  }

  /// Async-signal-safe and idempotent
  pub fn cancel(&self) {
    self.inner.cancelled.store(true, Ordering::SeqCst);
    let byte = 1u8;
    // A full pipe is already readable
    unsafe {
      libc::write(self.inner.write, &byte as *const u8 as *const libc::c_void, 1);
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::SeqCst)
  }

  /// Sleep up to `timeout`, returning early once cancelled
  pub fn wait(&self, timeout: Duration) -> bool {
    if self.is_cancelled() {
      return true;
    }
    let mut fds = [PollFd::new(self.inner.read, PollFlags::POLLIN)];
    match poll(&mut fds, poll_timeout(timeout)) {
      Ok(_) | Err(Errno::EINTR) => {}
      Err(errno) => debug!("Poll cancel pipe fails: {}", errno),
    }
    self.is_cancelled()
  }

  /// Read end of the self-pipe, readable once cancelled
  pub(crate) fn as_raw_fd(&self) -> RawFd {
    self.inner.read
  }
}

impl Drop for CancelInner {
  fn drop(&mut self) {
    let _ = close(self.read);
    let _ = close(self.write);
  }
}

extern "C" fn handle_signal(_signal: libc::c_int) {
  if let Some(token) = INSTALLED.get() {
    token.cancel();
  }
}

/// Convert to a poll(2) timeout, rounding up so a short wait never spins
pub(crate) fn poll_timeout(timeout: Duration) -> libc::c_int {
  let millis = timeout.as_micros().div_ceil(1000);
  millis.min(libc::c_int::MAX as u128) as libc::c_int
}

#[cfg(test)]
mod tests {
  use std::thread;
  use std::time::Instant;

  use super::*;

  #[test]
  fn it_should_time_out_without_cancel() {
    let token = CancelToken::new().unwrap();
    assert!(!token.wait(Duration::from_millis(20)));
    assert!(!token.is_cancelled());
  }

  #[test]
  fn it_should_wake_waiter_on_cancel() {
    let token = CancelToken::new().unwrap();
    let remote = token.clone();
    let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(50));
      remote.cancel();
    });

    let start = Instant::now();
    assert!(token.wait(Duration::from_secs(10)));
    assert!(start.elapsed() < Duration::from_secs(5));
    handle.join().unwrap();
  }

  #[test]
  fn it_should_be_idempotent() {
    let token = CancelToken::new().unwrap();
    token.cancel();
    token.cancel();
    assert!(token.is_cancelled());
    assert!(token.wait(Duration::from_secs(10)));
    assert!(token.wait(Duration::from_secs(10)));
  }

  #[test]
  fn it_should_round_poll_timeout_up() {
    assert_eq!(poll_timeout(Duration::from_micros(1)), 1);
    assert_eq!(poll_timeout(Duration::from_millis(500)), 500);
    assert_eq!(poll_timeout(Duration::ZERO), 0);
  }
}
