use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{error, info, Record};

use judgebox::{CancelToken, EvaluationRequest, Judge, JudgeConfig, JudgeError, JudgeOutcome, KillStrategy, Verdict};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[arg(long, help = "Python interpreter (default: $JUDGEBOX_PYTHON or python3)")]
  python: Option<String>,

  #[arg(long, default_value_t = 10000, help = "Syntax check time limit (unit: ms)")]
  compile_time: u64,

  #[arg(long, value_enum, default_value_t = KillStrategy::Group, help = "How to terminate submissions")]
  kill: KillStrategy,

  #[arg(long, help = "Directory for the temporary source file")]
  workdir: Option<PathBuf>,

  #[arg(long, default_value_t = false)]
  verbose: bool,
}

impl Cli {
  fn resolve(&self) -> JudgeConfig {
    let mut config = JudgeConfig::new();
    if let Some(python) = &self.python {
      config.python(python.clone());
    }
    config
      .compile_time_limit(self.compile_time)
      .kill_strategy(self.kill)
      .workdir(self.workdir.clone());
    config
  }
}

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Task successfully read from conf.json```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

/// Stdout carries the verdict, so logs go to a file and warnings to stderr
fn start_logger(verbose: bool) -> Result<LoggerHandle, JudgeError> {
  let spec = if verbose { "judgebox=debug" } else { "judgebox=info" };

  let file_logger = Logger::try_with_str(spec)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("judgebox")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(Duplicate::Warn)
    .format_for_files(default_format)
    .start();

  match file_logger {
    Ok(handle) => Ok(handle),
    Err(err) => {
      eprintln!("Judge Logger Error: {}, log to stderr instead", err);
      Ok(Logger::try_with_str(spec)?.log_to_stderr().format(default_format).start()?)
    }
  }
}

fn emit(verdict: &Verdict) -> ExitCode {
  match verdict.emit(&mut io::stdout().lock()) {
    Ok(_) => ExitCode::SUCCESS,
    Err(err) => {
      error!("Emit verdict fails: {}", err);
      ExitCode::FAILURE
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  let config = cli.resolve();

  let _logger = match start_logger(cli.verbose) {
    Ok(handle) => Some(handle),
    Err(err) => {
      eprintln!("{}", err);
      None
    }
  };

  info!("Start running judgebox");

  let mut raw = String::new();
  if let Err(err) = io::stdin().read_to_string(&mut raw) {
    error!("Read request fails: {}", err);
    return emit(&Verdict::decode_error(&JudgeError::decode(err.to_string()), ""));
  }

  let request = match EvaluationRequest::decode(&raw) {
    Ok(Some(request)) => request,
    Ok(None) => return ExitCode::SUCCESS,
    Err(failure) => {
      error!("Decode request fails: {}", failure.error);
      return emit(&Verdict::decode_error(&failure.error, &failure.input));
    }
  };

  let token = match CancelToken::new().and_then(|token| token.install().map(|_| token)) {
    Ok(token) => token,
    Err(err) => {
      error!("Install cancel handlers fails: {}", err);
      return emit(&Verdict::system_error(&err.detail(), &request));
    }
  };

  let judge = Judge::new(config, token);
  match judge.evaluate(&request) {
    // A signal after evaluation still suppresses the verdict
    JudgeOutcome::Verdict(verdict) if !judge.token().is_cancelled() => {
      let code = emit(&verdict);
      info!("Running judgebox finished");
      code
    }
    _ => {
      info!("Judge is cancelled, exit without verdict");
      std::process::exit(0);
    }
  }
}
