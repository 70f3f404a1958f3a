use std::process;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod demo;

/// Exit code for bad command-line usage (sysexits EX_USAGE).
const EXIT_USAGE: i32 = 64;

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Run { timeout: Duration, steps: usize },
    Pool { capacity: usize, clients: usize, rounds: usize },
    Work { workers: usize, items: usize },
    Version,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            print_usage();
            process::exit(EXIT_USAGE);
        }
    };

    init_tracing();

    match demo::run(command).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: corral <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run     Run steps under a deadline (exit 1 on timeout, 2 on interrupt)");
    eprintln!("  pool    Share a resource pool between concurrent clients");
    eprintln!("  work    Hand jobs to a fixed set of workers");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  run:  --timeout <secs> [default: 3]  --steps <n> [default: 3]");
    eprintln!("  pool: --capacity <n> [default: 2]  --clients <n> [default: 5]  --rounds <n> [default: 2]");
    eprintln!("  work: --workers <n> [default: 2]  --items <n> [default: 10]");
    eprintln!("  -V, --version    Print version information");
    eprintln!("  -h, --help       Print this help");
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut rest = args.iter().skip(1); // skip argv[0]

    let sub = match rest.next().map(String::as_str) {
        Some("--version") | Some("-V") => return Ok(Command::Version),
        Some("--help") | Some("-h") | None => return Err(String::new()),
        Some(sub) => sub.to_string(),
    };

    let mut command = match sub.as_str() {
        "run" => Command::Run {
            timeout: Duration::from_secs(3),
            steps: 3,
        },
        "pool" => Command::Pool {
            capacity: 2,
            clients: 5,
            rounds: 2,
        },
        "work" => Command::Work {
            workers: 2,
            items: 10,
        },
        other => return Err(format!("unknown command: {other}")),
    };

    while let Some(flag) = rest.next() {
        let flag = flag.as_str();
        if flag == "--help" || flag == "-h" {
            return Err(String::new());
        }
        if !flag.starts_with('-') {
            return Err(format!("unexpected argument: {flag}"));
        }

        let value = rest
            .next()
            .ok_or_else(|| format!("{flag} requires a value"))?;

        match (&mut command, flag) {
            (Command::Run { timeout, .. }, "--timeout") => *timeout = parse_secs(flag, value)?,
            (Command::Run { steps, .. }, "--steps") => *steps = parse_count(flag, value)?,
            (Command::Pool { capacity, .. }, "--capacity") => {
                *capacity = parse_positive(flag, value)?
            }
            (Command::Pool { clients, .. }, "--clients") => *clients = parse_count(flag, value)?,
            (Command::Pool { rounds, .. }, "--rounds") => *rounds = parse_count(flag, value)?,
            (Command::Work { workers, .. }, "--workers") => *workers = parse_positive(flag, value)?,
            (Command::Work { items, .. }, "--items") => *items = parse_count(flag, value)?,
            _ => return Err(format!("unknown flag for {sub}: {flag}")),
        }
    }

    Ok(command)
}

fn parse_count(flag: &str, value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| format!("{flag} expects a whole number, got '{value}'"))
}

fn parse_positive(flag: &str, value: &str) -> Result<usize, String> {
    match parse_count(flag, value)? {
        0 => Err(format!("{flag} must be at least 1")),
        n => Ok(n),
    }
}

fn parse_secs(flag: &str, value: &str) -> Result<Duration, String> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("{flag} expects a non-negative number of seconds, got '{value}'"))
}

/// Initialize tracing with CORRAL_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("CORRAL_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!("corral={base_level},corral_cli={base_level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
