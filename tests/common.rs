#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use flexi_logger::Logger;
use log::info;
use nix::sys::signal::kill;
use nix::unistd::Pid;

static INIT: Once = Once::new();

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("judgebox=debug,info")
      .unwrap()
      .start()
      .unwrap();
  });
}

/// Most tests need a real interpreter
pub fn has_python() -> bool {
  let found = Command::new("python3")
    .arg("--version")
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status()
    .map(|status| status.success())
    .unwrap_or(false);
  if !found {
    info!("python3 is not available, skip");
  }
  found
}

pub fn count_files(dir: &Path) -> usize {
  fs::read_dir(dir).unwrap().count()
}

/// Zombies count as dead
pub fn is_alive(pid: i32) -> bool {
  if kill(Pid::from_raw(pid), None).is_err() {
    return false;
  }
  match fs::read_to_string(format!("/proc/{}/stat", pid)) {
    Ok(stat) => match stat.rsplit_once(") ") {
      Some((_, rest)) => !rest.starts_with('Z'),
      None => true,
    },
    Err(_) => false,
  }
}

pub fn wait_dead(pid: i32, timeout: Duration) -> bool {
  let start = Instant::now();
  while start.elapsed() < timeout {
    if !is_alive(pid) {
      return true;
    }
    thread::sleep(Duration::from_millis(20));
  }
  !is_alive(pid)
}

/// Read a pid the submission wrote to `path`
pub fn read_pid(path: &Path, timeout: Duration) -> Option<i32> {
  let start = Instant::now();
  while start.elapsed() < timeout {
    if let Ok(text) = fs::read_to_string(path) {
      if let Ok(pid) = text.trim().parse::<i32>() {
        return Some(pid);
      }
    }
    thread::sleep(Duration::from_millis(20));
  }
  None
}
