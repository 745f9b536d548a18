use std::fmt;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use assess_core::Catalog;
use assess_core::model::{AdvanceOutcome, ScenarioId};
use services::{
    AppServices, AssessmentConfig, AssessmentSession, Clock, Countdown, EngineState,
    PythonBootstrap, RunIgnored, RunOutcome, SessionSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const BUNDLED_CATALOG: &str = include_str!("../assets/scenarios.json");

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidScenario { raw: String },
    MissingFlag { flag: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidScenario { raw } => write!(f, "invalid --scenario value: {raw}"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
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
    eprintln!("  assess list     [--catalog <file>]");
    eprintln!("  assess practice --scenario <id> [--db <sqlite_url>] [--catalog <file>] [--python <bin>]");
    eprintln!("  assess check    --scenario <id> --solution <file> [--db <sqlite_url>] [--catalog <file>] [--python <bin>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:assess.sqlite3");
    eprintln!("  --catalog <bundled scenarios>");
    eprintln!("  --python python3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ASSESS_DB_URL, ASSESS_CATALOG, ASSESS_PYTHON, ASSESS_LOG");
    eprintln!("  ASSESS_TIME_BUDGET_SECS, ASSESS_TICK_MILLIS, ASSESS_KEY_PREFIX");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    List,
    Practice,
    Check,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "list" => Some(Self::List),
            "practice" => Some(Self::Practice),
            "check" => Some(Self::Check),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    catalog: Option<PathBuf>,
    python: PathBuf,
    scenario: Option<ScenarioId>,
    solution: Option<PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("ASSESS_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("sqlite:assess.sqlite3".into()), normalize_sqlite_url),
            catalog: std::env::var_os("ASSESS_CATALOG").map(PathBuf::from),
            python: std::env::var_os("ASSESS_PYTHON")
                .map_or_else(|| PathBuf::from(services::engine::DEFAULT_PYTHON), PathBuf::from),
            scenario: None,
            solution: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--catalog" => parsed.catalog = Some(require_value(args, "--catalog")?.into()),
                "--python" => parsed.python = require_value(args, "--python")?.into(),
                "--solution" => parsed.solution = Some(require_value(args, "--solution")?.into()),
                "--scenario" => {
                    let value = require_value(args, "--scenario")?;
                    let id = value
                        .parse::<ScenarioId>()
                        .map_err(|_| ArgsError::InvalidScenario { raw: value.clone() })?;
                    parsed.scenario = Some(id);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn scenario(&self) -> Result<&ScenarioId, ArgsError> {
        self.scenario
            .as_ref()
            .ok_or(ArgsError::MissingFlag { flag: "--scenario" })
    }
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
    let path = std::path::Path::new(&path_str);
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

    let path = std::path::Path::new(path);
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

fn init_tracing() {
    let filter = std::env::var("ASSESS_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    // Logs go to stderr so they never interleave with program output on stdout.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn load_catalog(path: Option<&PathBuf>) -> Result<Catalog, Box<dyn std::error::Error>> {
    let catalog = match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            Catalog::from_json(&raw)?
        }
        None => Catalog::from_json(BUNDLED_CATALOG)?,
    };
    tracing::debug!(scenarios = catalog.len(), "catalog loaded");
    Ok(catalog)
}

async fn build_services(
    args: &Args,
    catalog: Catalog,
) -> Result<AppServices, Box<dyn std::error::Error>> {
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(
        &args.db_url,
        Arc::new(catalog),
        Arc::new(PythonBootstrap::new(&args.python)),
        Clock::default_clock(),
        AssessmentConfig::from_env(),
    )
    .await?;
    Ok(services)
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

fn list(catalog: &Catalog) {
    for scenario in catalog.iter() {
        println!(
            "{:<12} {:<7} {} ({} levels)",
            scenario.id(),
            scenario.difficulty(),
            scenario.title(),
            scenario.level_count()
        );
        if !scenario.summary().is_empty() {
            println!("{:<12} {}", "", scenario.summary());
        }
    }
}

/// Run a solution file through every level it passes. Returns whether the
/// assessment was completed.
async fn check(services: &AppServices, args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let id = args.scenario()?;
    let solution = args
        .solution
        .as_ref()
        .ok_or(ArgsError::MissingFlag { flag: "--solution" })?;
    let code = tokio::fs::read_to_string(solution).await?;

    let session = services.open_session(id).await?;
    if session.prepare_engine().await != EngineState::Ready {
        let reason = services.engine().failure().unwrap_or("unknown error").to_string();
        return Err(format!("execution engine unavailable: {reason}").into());
    }
    session.edit_code(code).await;

    let walk = session.run_through().await;
    for report in &walk.reports {
        let level = session
            .scenario()
            .level(report.level_index)
            .map_or("", |level| level.title());
        println!("── {level}");
        println!("{}", report.output);
        println!();
    }

    if walk.completed {
        println!("Assessment complete: all {} levels passed.", walk.levels_passed);
    } else {
        println!(
            "Passed {} of {} levels.",
            walk.levels_passed,
            session.scenario().level_count()
        );
    }
    Ok(walk.completed)
}

async fn practice(services: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let session = Arc::new(services.open_session(args.scenario()?).await?);
    let config = services.config();

    let loader = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session.prepare_engine().await;
            println!("\n{}", session.snapshot().last_output);
        })
    };
    let countdown = Countdown::start(Arc::clone(&session), config.tick_period);

    print_level(&session);
    println!("Type `help` for commands.");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&session.snapshot())?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

        match cmd {
            "" => {}
            "help" => print_repl_help(),
            "show" => print_level(&session),
            "code" => println!("{}", session.snapshot().code),
            "load" => {
                if rest.trim().is_empty() {
                    println!("usage: load <file>");
                    continue;
                }
                match tokio::fs::read_to_string(rest.trim()).await {
                    Ok(code) => {
                        session.edit_code(code).await;
                        println!("Loaded {}.", rest.trim());
                    }
                    Err(err) => println!("could not read {}: {err}", rest.trim()),
                }
            }
            "run" => match session.run().await {
                RunOutcome::Completed(report) => println!("{}", report.output),
                RunOutcome::Ignored(RunIgnored::EngineNotReady) => {
                    println!("{}", session.snapshot().last_output);
                }
                RunOutcome::Ignored(RunIgnored::AlreadyRunning) => println!("A run is already in progress."),
            },
            "next" => match session.advance() {
                AdvanceOutcome::Advanced { .. } => {
                    println!("{}", session.snapshot().last_output);
                    print_level(&session);
                }
                AdvanceOutcome::NotPassed => println!("Pass the current level first."),
                AdvanceOutcome::AssessmentComplete => println!("Assessment complete. There are no more levels."),
            },
            "reset" => {
                if confirm(&mut input, "Reset code to the first level's starter? [y/N] ").await? {
                    session.reset().await;
                    println!("{}", session.snapshot().last_output);
                }
            }
            "status" => print_status(&session.snapshot()),
            "quit" | "exit" => break,
            other => println!("unknown command: {other}"),
        }
    }

    countdown.stop();
    loader.abort();
    Ok(())
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn print_repl_help() {
    println!("  show         level prompt and status");
    println!("  code         print the current buffer");
    println!("  load <file>  replace the buffer with a file");
    println!("  run          run the buffer against the level's tests");
    println!("  next         move to the next level after a pass");
    println!("  reset        restore the first level's starter code");
    println!("  status       time remaining and last output");
    println!("  quit");
}

fn print_level(session: &AssessmentSession) {
    let snap = session.snapshot();
    let level = session.active_level();
    println!();
    println!(
        "{} · Level {}/{} · {}",
        session.scenario().title(),
        snap.level_index + 1,
        snap.level_count,
        level.title()
    );
    println!("{}", level.description());
    print_status(&snap);
}

fn print_status(snap: &SessionSnapshot) {
    let warning = if snap.is_low_time() { "  (low time!)" } else { "" };
    println!(
        "[{}{}] status: {} · engine: {}",
        snap.time_display(),
        warning,
        snap.status,
        snap.engine
    );
    println!("{}", snap.last_output);
}

fn prompt(snap: &SessionSnapshot) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "[{}] > ", snap.time_display())?;
    stdout.flush()
}

async fn confirm(input: &mut Lines<BufReader<Stdin>>, question: &str) -> std::io::Result<bool> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{question}")?;
    stdout.flush()?;
    let answer = input.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(true);
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let catalog = load_catalog(parsed.catalog.as_ref()).await?;

    match cmd {
        Command::List => {
            list(&catalog);
            Ok(true)
        }
        Command::Practice => {
            let services = build_services(&parsed, catalog).await?;
            practice(&services, &parsed).await?;
            Ok(true)
        }
        Command::Check => {
            let services = build_services(&parsed, catalog).await?;
            check(&services, &parsed).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            // At this layer (binary glue), printing once is fine.
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}
