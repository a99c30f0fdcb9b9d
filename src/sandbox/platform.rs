use std::os::unix::process::CommandExt;
use std::process::Command;

use clap::ValueEnum;
use log::{debug, info};
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

use crate::error::JudgeError;

/// How the judge terminates a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KillStrategy {
  /// Spawn in a new process group and signal the whole group
  Group,
  /// Signal the child process only
  Process,
}

/// Platform capability for putting a child in its own group and killing it
pub trait ProcessControl: Send + Sync {
  fn name(&self) -> &'static str;

  /// Adjust the command before spawn
  fn configure(&self, command: &mut Command);

  /// Forcefully terminate the child (and whatever shares its group).
  ///
  /// The caller must not have reaped `pid` yet.
  fn terminate(&self, pid: Pid) -> Result<(), JudgeError>;
}

pub struct ProcessGroupControl;

pub struct SingleProcessControl;

impl ProcessControl for ProcessGroupControl {
  fn name(&self) -> &'static str {
    "process group"
  }

  fn configure(&self, command: &mut Command) {
    // pgid = pid of the child
    command.process_group(0);
  }

  fn terminate(&self, pid: Pid) -> Result<(), JudgeError> {
    match killpg(pid, Signal::SIGKILL) {
      Ok(_) => {
        debug!("Send SIGKILL to process group #{}.", pid);
        Ok(())
      }
      // Group already empty
      Err(Errno::ESRCH) => Ok(()),
      Err(errno) => Err(errno.into()),
    }
  }
}

impl ProcessControl for SingleProcessControl {
  fn name(&self) -> &'static str {
    "single process"
  }

  fn configure(&self, _command: &mut Command) {}

  fn terminate(&self, pid: Pid) -> Result<(), JudgeError> {
    match kill(pid, Signal::SIGKILL) {
      Ok(_) => {
        debug!("Send SIGKILL to process #{}.", pid);
        Ok(())
      }
      Err(Errno::ESRCH) => Ok(()),
      Err(errno) => Err(errno.into()),
    }
  }
}

/// Pick the control implementation once at startup
pub fn select(strategy: KillStrategy) -> Box<dyn ProcessControl> {
  let control: Box<dyn ProcessControl> = match strategy {
    KillStrategy::Group => Box::new(ProcessGroupControl),
    KillStrategy::Process => Box::new(SingleProcessControl),
  };
  info!("Use {} termination", control.name());
  control
}

/// Block until `pid` exits, leaving it as a zombie.
///
/// The pid (and its process group id) stays reserved until someone reaps it.
pub fn wait_exit_nowait(pid: Pid) -> Result<(), JudgeError> {
  loop {
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let ret = unsafe {
      libc::waitid(
        libc::P_PID,
        pid.as_raw() as libc::id_t,
        &mut info,
        libc::WEXITED | libc::WNOWAIT,
      )
    };
    if ret == 0 {
      return Ok(());
    }
    match Errno::last() {
      Errno::EINTR => continue,
      errno => return Err(errno.into()),
    }
  }
}
