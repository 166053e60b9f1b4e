mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_ADDRESS_ERROR, EXIT_FAILURE, EXIT_STATE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;
use terrane_core::install_signal_handler;

#[derive(Debug, Parser)]
#[command(
    name = "terrane",
    version,
    about = "Inspect and repair terrane resource instance state"
)]
struct Cli {
    /// Path to the state file.
    #[arg(long, default_value = "terrane.tfstate", global = true)]
    state: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List every resource instance and its deposed objects.
    List,
    /// Show the objects recorded for one resource instance.
    Show {
        /// Resource instance address, e.g. module.a.aws_instance.b[0].
        address: String,
    },
    /// List module output values. Sensitive values are redacted.
    Outputs,
    /// Check the state file's checksum and structure.
    Verify,
    /// Forget a deposed object whose real-world object is already gone.
    Forget {
        /// Resource instance address.
        address: String,
        /// Deposed key of the object to forget.
        #[arg(long)]
        deposed: String,
    },
    /// Show the remote workspace configuration.
    Remote {
        /// Config file (defaults to ~/.config/terrane/remote.json).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TERRANE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let state_path = cli.state;
    let json_output = cli.json;

    let result = match cli.command {
        Commands::List => commands::list::run(&state_path, json_output),
        Commands::Show { address } => commands::show::run(&state_path, &address, json_output),
        Commands::Outputs => commands::outputs::run(&state_path, json_output),
        Commands::Verify => commands::verify::run(&state_path, json_output),
        Commands::Forget { address, deposed } => {
            commands::forget::run(&state_path, &address, &deposed, json_output)
        }
        Commands::Remote { config } => commands::remote::run(config.as_deref(), json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("invalid address")
                || msg.starts_with("no resource instance")
            {
                EXIT_ADDRESS_ERROR
            } else if msg.starts_with("state error:") || msg.starts_with("no state file") {
                EXIT_STATE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
