mod terminal;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use services::{
    BlankFrameSource, ConnectionManager, FrameSampler, FrameSource, HealthProbe, JpegFrameEncoder,
    ProgressStore, SessionLoop, StillFrameSource, TrainerConfig, WebSocketConnector,
};
use sign_core::{PracticeSession, ProgressTracker, StabilityGate};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::terminal::Input;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidSymbols { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSymbols { raw } => write!(f, "invalid --symbols value: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- practice [options]");
    eprintln!("  cargo run -p app -- check    [options]   # probe the service and exit");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file.toml>   trainer settings");
    eprintln!("  --db <sqlite_url>      progress database (default sqlite://signs.sqlite3)");
    eprintln!("  --page-url <url>       where the service is hosted (default {})", services::config::DEFAULT_PAGE_URL);
    eprintln!("  --profile <name>       learner profile (default {})", services::config::DEFAULT_PROFILE);
    eprintln!("  --symbols <a,b,c>      practice list");
    eprintln!("  --frames <path>        image file or directory to replay instead of a camera (repeatable)");
    eprintln!("  --verbose              show every live candidate");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SIGNS_CONFIG, SIGNS_DB_URL, SIGNS_PAGE_URL, SIGNS_PROFILE, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Practice,
    Check,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "practice" => Some(Self::Practice),
            "check" => Some(Self::Check),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    db_url: String,
    page_url: Option<String>,
    profile: Option<String>,
    symbols: Option<Vec<String>>,
    frames: Vec<PathBuf>,
    verbose: bool,
}

impl Args {
    /// Environment first, flags on top.
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            config_path: non_empty_env("SIGNS_CONFIG").map(PathBuf::from),
            db_url: non_empty_env("SIGNS_DB_URL")
                .map_or_else(|| "sqlite://signs.sqlite3".into(), normalize_sqlite_url),
            page_url: non_empty_env("SIGNS_PAGE_URL"),
            profile: non_empty_env("SIGNS_PROFILE"),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config_path = Some(require_value(args, "--config")?.into()),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--page-url" => parsed.page_url = Some(require_value(args, "--page-url")?),
                "--profile" => parsed.profile = Some(require_value(args, "--profile")?),
                "--symbols" => {
                    let value = require_value(args, "--symbols")?;
                    let symbols: Vec<String> = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect();
                    if symbols.is_empty() {
                        return Err(ArgsError::InvalidSymbols { raw: value });
                    }
                    parsed.symbols = Some(symbols);
                }
                "--frames" => parsed.frames.push(require_value(args, "--frames")?.into()),
                "--verbose" | "-v" => parsed.verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    /// Defaults, then the config file, then env and flags.
    fn trainer_config(&self) -> Result<TrainerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config_path {
            Some(path) => TrainerConfig::load(path)?,
            None => TrainerConfig::default(),
        };
        if let Some(page_url) = &self.page_url {
            config.page_url.clone_from(page_url);
        }
        if let Some(profile) = &self.profile {
            config.profile.clone_from(profile);
        }
        if let Some(symbols) = &self.symbols {
            config.symbols.clone_from(symbols);
        }
        Ok(config)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Image files to replay, with directories expanded in name order.
fn frame_files(inputs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| {
                            matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png")
                        })
                })
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

async fn probe(page_url: &str) {
    match HealthProbe::for_page(page_url) {
        Ok(probe) => match probe.check().await {
            Ok(()) => info!(url = %probe.url(), "recognition service healthy"),
            Err(err) => warn!(url = %probe.url(), error = %err, "recognition service not healthy yet"),
        },
        Err(err) => warn!(error = %err, "cannot build health probe"),
    }
}

async fn practice(parsed: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = parsed.trainer_config()?.validate()?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    probe(settings.page_url.as_str()).await;

    let store = ProgressStore::new(Arc::clone(&storage.progress), settings.profile.clone());
    let state = store.load(&settings.catalog).await;
    let tracker = ProgressTracker::with_state(settings.catalog.clone(), settings.progress, state)?;
    let session = PracticeSession::new(StabilityGate::new(settings.stability), tracker);

    let connection = ConnectionManager::new(Arc::new(WebSocketConnector::new()), settings.endpoint.clone())
        .with_reconnect_delay(settings.reconnect_delay);

    let frames = frame_files(&parsed.frames)?;
    let source: Box<dyn FrameSource> = if frames.is_empty() {
        warn!("no --frames given, streaming blank frames");
        Box::new(BlankFrameSource::new(settings.sampler.width, settings.sampler.height))
    } else {
        info!(count = frames.len(), "replaying still frames");
        Box::new(StillFrameSource::new(frames))
    };
    let sampler = FrameSampler::new(
        source,
        Box::new(JpegFrameEncoder::new(settings.jpeg_quality)),
        settings.sampler,
    );

    info!(
        profile = %settings.profile,
        endpoint = %settings.endpoint,
        symbols = settings.catalog.len(),
        "starting practice"
    );
    let (handle, events) =
        SessionLoop::new(session, settings.labels, connection, sampler, store).spawn();
    let mut printer = tokio::spawn(terminal::print_events(events, parsed.verbose));

    println!("{}", terminal::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printer_done = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match terminal::parse_input(&line) {
                    Ok(Some(Input::Navigate(navigation))) => {
                        if !handle.navigate(navigation).await {
                            break;
                        }
                    }
                    Ok(Some(Input::Help)) => println!("{}", terminal::HELP),
                    Ok(Some(Input::Quit)) => break,
                    Ok(None) => {}
                    Err(err) => println!("{err}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            // The loop ended on its own (capture failure).
            _ = &mut printer => {
                printer_done = true;
                break;
            }
        }
    }

    let report = handle.shutdown().await?;
    if !printer_done {
        let _ = printer.await;
    }
    info!(
        frames_sent = report.sampler.frames_sent,
        ticks_skipped = report.sampler.ticks_skipped,
        messages = report.messages,
        malformed = report.malformed,
        confirmations = report.confirmations,
        reconnects = report.connection.reconnects_scheduled,
        "session ended"
    );
    println!(
        "mastered {} of {} signs, best streak {}",
        report.state.mastered().len(),
        settings.catalog.len(),
        report.state.best_streak()
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: practice when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Practice,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with('-') => Command::Practice,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with('-') {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    match cmd {
        Command::Practice => practice(parsed).await,
        Command::Check => {
            let settings = parsed.trainer_config()?.validate()?;
            let probe = HealthProbe::for_page(settings.page_url.as_str())?;
            probe.check().await?;
            println!("{} is healthy", probe.url());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = list.iter().map(|s| (*s).to_owned());
        Args::parse(&mut iter)
    }

    #[test]
    fn flags_override_config_defaults() {
        let parsed = args(&[
            "--page-url",
            "https://signs.example.org/",
            "--profile",
            "ada",
            "--symbols",
            "hello, thanks ,,yes",
            "--db",
            "sqlite::memory:",
        ])
        .unwrap();
        assert_eq!(parsed.db_url, "sqlite::memory:");

        let config = parsed.trainer_config().unwrap();
        assert_eq!(config.page_url, "https://signs.example.org/");
        assert_eq!(config.profile, "ada");
        assert_eq!(config.symbols, vec!["hello", "thanks", "yes"]);
        assert_eq!(config.stability_window, 3);
    }

    #[test]
    fn bad_flags_are_reported() {
        assert!(matches!(args(&["--db"]), Err(ArgsError::MissingValue { flag: "--db" })));
        assert!(matches!(args(&["--db", " "]), Err(ArgsError::InvalidDbUrl { .. })));
        assert!(matches!(args(&["--symbols", ", ,"]), Err(ArgsError::InvalidSymbols { .. })));
        assert!(matches!(args(&["--nope"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:/tmp/signs.db".into()),
            "sqlite:///tmp/signs.db"
        );
        assert!(normalize_sqlite_url("signs.db".into()).starts_with("sqlite:///"));
    }
}
