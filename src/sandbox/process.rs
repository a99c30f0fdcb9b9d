use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::prelude::{FromRawFd, RawFd};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd::{close, pipe2, Pid};

use crate::config::JudgeConfig;
use crate::error::JudgeError;
use crate::sandbox::cancel::{poll_timeout, CancelToken};
use crate::sandbox::platform::{wait_exit_nowait, ProcessControl};

/// How one child process ended
#[derive(Debug)]
pub enum ProcessOutcome {
  Exited {
    status: ExitStatus,
    stdout: String,
    stderr: String,
    elapsed: Duration,
  },
  TimedOut {
    elapsed: Duration,
  },
  Cancelled,
}

/// Owns a spawned child until it is reaped.
///
/// Dropping the guard terminates the child (with its group) and reaps it with
/// a bounded wait, so no exit path leaves a running child or a zombie behind.
pub(crate) struct ChildGuard<'a> {
  child: Child,
  control: &'a dyn ProcessControl,
  reap_timeout: Duration,
  reaped: bool,
}

impl<'a> ChildGuard<'a> {
  fn new(child: Child, control: &'a dyn ProcessControl, reap_timeout: Duration) -> Self {
    ChildGuard {
      child,
      control,
      reap_timeout,
      reaped: false,
    }
  }

  fn pid(&self) -> Pid {
    Pid::from_raw(self.child.id() as i32)
  }

  /// Signal the child, never after it has been reaped
  fn terminate(&self) {
    if self.reaped {
      return;
    }
    if let Err(err) = self.control.terminate(self.pid()) {
      error!("Fails terminating child process #{}: {}", self.pid(), err);
    }
  }

  fn reap(&mut self) -> Result<ExitStatus, JudgeError> {
    let status = self.child.wait()?;
    self.reaped = true;
    debug!("Child process #{}. reaped: {}", self.pid(), status);
    Ok(status)
  }

  /// Reap within `reap_timeout`, giving up silently afterwards
  fn reap_bounded(&mut self) {
    if self.reaped {
      return;
    }
    let deadline = Instant::now() + self.reap_timeout;
    loop {
      match self.child.try_wait() {
        Ok(Some(status)) => {
          self.reaped = true;
          debug!("Child process #{}. reaped: {}", self.pid(), status);
          return;
        }
        Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
        Ok(None) => {
          warn!("Child process #{}. is not reaped in time", self.pid());
          return;
        }
        Err(err) => {
          error!("Fails reaping child process #{}: {}", self.pid(), err);
          return;
        }
      }
    }
  }

  fn release(&mut self) {
    if !self.reaped {
      self.terminate();
      self.reap_bounded();
    }
  }
}

impl Drop for ChildGuard<'_> {
  fn drop(&mut self) {
    self.release();
  }
}

/// Readable end of a pipe that becomes readable once the child has exited
struct ExitWatch {
  read: RawFd,
}

impl ExitWatch {
  fn start(pid: Pid) -> Result<Self, JudgeError> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
    thread::spawn(move || {
      match wait_exit_nowait(pid) {
        Ok(_) => {}
        // Already reaped by the judge after a kill
        Err(JudgeError::Nix(Errno::ECHILD)) => {}
        Err(err) => error!("Fails waiting child process #{}: {}", pid, err),
      }
      let mut notify = unsafe { File::from_raw_fd(write) };
      let _ = notify.write_all(&[1]);
    });
    Ok(ExitWatch { read })
  }
}

impl Drop for ExitWatch {
  fn drop(&mut self) {
    let _ = close(self.read);
  }
}

fn feed(stdin: Option<impl Write + Send + 'static>, input: &str) {
  if let Some(mut stdin) = stdin {
    let input = input.as_bytes().to_vec();
    thread::spawn(move || {
      match stdin.write_all(&input) {
        Ok(_) => {}
        // Child stopped reading
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
        Err(err) => warn!("Fails writing child stdin: {}", err),
      }
      // Dropping stdin sends EOF
    });
  }
}

/// Output of one child stream, filled by a reader thread as it arrives
struct Drain {
  buf: Arc<Mutex<Vec<u8>>>,
  done: Receiver<()>,
}

impl Drain {
  fn start(stream: Option<impl Read + Send + 'static>) -> Self {
    let buf = Arc::new(Mutex::new(vec![]));
    let (sender, done) = mpsc::channel();
    if let Some(mut stream) = stream {
      let shared = Arc::clone(&buf);
      thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
          match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => lock(&shared).extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
              warn!("Fails reading child output: {}", err);
              break;
            }
          }
        }
        let _ = sender.send(());
      });
    }
    // Without a stream the sender is gone and `collect` returns at once
    Drain { buf, done }
  }

  /// Wait for EOF until `timeout` after `since`, then take what was read
  fn collect(&self, since: Instant, timeout: Duration) -> String {
    let remaining = timeout.saturating_sub(since.elapsed());
    if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(remaining) {
      warn!(
        "Child output is still open after {} ms, keep {} bytes read so far",
        timeout.as_millis(),
        lock(&self.buf).len()
      );
    }
    let buf = lock(&self.buf);
    String::from_utf8_lossy(&buf).into_owned()
  }
}

fn lock(buf: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
  buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Wake {
  Exited,
  Deadline,
  Cancelled,
}

/// Block until the child exits, the deadline passes or the token is cancelled.
///
/// Cancellation is checked first so that it wins a race with a normal exit.
fn wait_for(
  exit: &ExitWatch,
  token: &CancelToken,
  start: Instant,
  limit: Duration,
) -> Result<Wake, JudgeError> {
  loop {
    if token.is_cancelled() {
      return Ok(Wake::Cancelled);
    }

    let mut fds = [
      PollFd::new(token.as_raw_fd(), PollFlags::POLLIN),
      PollFd::new(exit.read, PollFlags::POLLIN),
    ];
    let elapsed = start.elapsed();
    let remaining = limit.saturating_sub(elapsed);
    let ready = match poll(&mut fds, poll_timeout(remaining)) {
      Ok(ready) => ready,
      Err(Errno::EINTR) => continue,
      Err(errno) => return Err(errno.into()),
    };

    if token.is_cancelled() {
      return Ok(Wake::Cancelled);
    }
    let exited = fds[1]
      .revents()
      .map_or(false, |events| !events.is_empty());
    if ready > 0 && exited {
      return Ok(Wake::Exited);
    }
    if start.elapsed() >= limit {
      return Ok(Wake::Deadline);
    }
  }
}

/// Spawn `command` in the sandbox, feed it `input` and wait with a deadline.
///
/// The clock starts right before spawn. Spawn failures are returned as
/// [`JudgeError::Launch`].
pub fn run_process(
  command: &mut Command,
  input: &str,
  limit: Duration,
  token: &CancelToken,
  control: &dyn ProcessControl,
  config: &JudgeConfig,
) -> Result<ProcessOutcome, JudgeError> {
  control.configure(command);
  command
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  if token.is_cancelled() {
    return Ok(ProcessOutcome::Cancelled);
  }

  let start = Instant::now();
  let child = command
    .spawn()
    .map_err(|err| JudgeError::launch(format!("{} ({:?})", err, command.get_program())))?;
  let mut guard = ChildGuard::new(child, control, config.get_reap_timeout());
  info!("Start running child process (pid = {})", guard.pid());

  feed(guard.child.stdin.take(), input);
  let stdout = Drain::start(guard.child.stdout.take());
  let stderr = Drain::start(guard.child.stderr.take());
  let exit = ExitWatch::start(guard.pid())?;

  match wait_for(&exit, token, start, limit)? {
    Wake::Cancelled => {
      info!("Child process #{}. is cancelled", guard.pid());
      guard.terminate();
      guard.reap_bounded();
      Ok(ProcessOutcome::Cancelled)
    }
    Wake::Deadline => {
      info!(
        "Child process #{}. exceeded time limit {} ms",
        guard.pid(),
        limit.as_millis()
      );
      guard.terminate();
      guard.reap()?;
      Ok(ProcessOutcome::TimedOut { elapsed: limit })
    }
    Wake::Exited => {
      let elapsed = start.elapsed();
      // The leader is an unreaped zombie here, so its group id is still ours
      guard.terminate();
      let status = guard.reap()?;
      info!(
        "Child process #{}. exited with {} in {} ms",
        guard.pid(),
        status,
        elapsed.as_millis()
      );
      // Both streams share one deadline, a descendant may still hold them open
      let drained = Instant::now();
      let stdout = stdout.collect(drained, config.get_drain_timeout());
      let stderr = stderr.collect(drained, config.get_drain_timeout());
      Ok(ProcessOutcome::Exited {
        status,
        stdout,
        stderr,
        elapsed,
      })
    }
  }
}
