//! hoptrace entry point.
//!
//! ## CLI Subcommands
//!
//! - `hoptrace` or `hoptrace watch` - Trace requests until Ctrl+C (default)
//! - `hoptrace submit` - Send one framed request to an entry node
//! - `hoptrace config show|defaults|validate` - Inspect configuration

use std::process::ExitCode;

use hoptrace::cli::{self, config_cmd};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("watch");
    let rest = args.get(2..).unwrap_or_default();

    let code = match command {
        "watch" | "" => cli::run_watch(rest).await,
        "submit" => cli::run_submit(rest).await,
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let json = args.get(3).map(|s| s.as_str()) == Some("--json");
                    config_cmd::run_show(json)
                }
                "defaults" => config_cmd::run_defaults(),
                "validate" => config_cmd::run_validate(),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    cli::EXIT_FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            match args.get(2) {
                Some(subcommand) => print_command_help(subcommand),
                None => print_usage(),
            }
            cli::EXIT_OK
        }
        "version" | "--version" | "-V" => {
            println!("hoptrace {}", env!("CARGO_PKG_VERSION"));
            cli::EXIT_OK
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            cli::EXIT_FAILURE
        }
    };

    ExitCode::from(code as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "hoptrace - request route tracer for edge proxy meshes v{}

USAGE:
    hoptrace [COMMAND] [OPTIONS]

COMMANDS:
    watch        Scrape proxy logs and print resolved routes (default)
    submit       Send one framed inference request to an entry node
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    hoptrace                                   # Watch until Ctrl+C
    hoptrace watch --once --stalled 60         # One pass, list stuck traces
    hoptrace submit --addr 10.0.0.5:8000 --payload img.jpg --precision fp16
    hoptrace config show --json

ENVIRONMENT:
    HOPTRACE_CONFIG      Optional TOML file (environment overrides it)
    HOPTRACE_NAMESPACE   Namespace of the proxy pods (default: kube-triton)
    HOPTRACE_OUTPUT      JSON-lines file for resolved traces
    HOPTRACE_LOG         Log filter (falls back to RUST_LOG)
    HOPTRACE_LOG_FORMAT  json, pretty or compact
    See `hoptrace config defaults` for the full list.

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "watch" => {
            eprintln!(
                "hoptrace watch - Trace requests through the mesh

USAGE:
    hoptrace watch [--once] [--stalled SECS]

OPTIONS:
    --once          Refresh membership, run one pass, exit
    --stalled SECS  On exit, list traces still building after SECS

DESCRIPTION:
    Polls the proxy container log of every running pod, correlates hop
    and timeout lines by request id and prints each route once it ends
    at a model, locally, or in a timeout. Route lines go to stdout;
    diagnostics go to stderr.
"
            );
        }
        "submit" => {
            eprintln!(
                "hoptrace submit - Send one framed request

USAGE:
    hoptrace submit --addr HOST:PORT --payload FILE [OPTIONS]

OPTIONS:
    --priority N      Priority field (default: 0)
    --accuracy N      Accuracy target (default: 0)
    --precision HINT  Precision hint, e.g. fp16
    --timeout SECS    Response timeout (default: 30)

DESCRIPTION:
    Prints the generated request id to stderr, the response body to
    stdout and the elapsed time to stderr.
"
            );
        }
        "config" => {
            eprintln!(
                "hoptrace config - Inspect configuration

USAGE:
    hoptrace config show [--json]
    hoptrace config defaults
    hoptrace config validate

EXIT CODES:
    0  Valid
    1  Loaded with warnings
    2  Cannot be loaded
"
            );
        }
        _ => {
            eprintln!("No detailed help for: {}", command);
            print_usage();
        }
    }
}
