//! CLI for monsoon: live CPU, memory and process telemetry in your terminal.

mod commands;
mod tui;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "monsoon")]
#[command(about = "monsoon: live host telemetry with bounded history windows")]
#[command(version = monsoon_core::VERSION)]
struct Cli {
    /// Log lifecycle events at debug level (stderr)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens a subscription.
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Samples of history kept per entity
    #[arg(long, default_value = "60")]
    capacity: usize,

    /// Provider push interval (e.g. 500ms, 1s, 2m)
    #[arg(long, default_value = "1s")]
    interval: String,

    /// Also drop samples older than this (e.g. 30s, 5m)
    #[arg(long)]
    max_age: Option<String>,

    /// Replay snapshots from a JSON file instead of reading this host
    #[arg(long)]
    replay: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard: CPU cores, memory and processes
    Monitor {
        /// Topic shown first: cpu, memory, processes
        #[arg(long, default_value = "cpu")]
        topic: String,

        /// Comma-separated visible columns for the first topic
        #[arg(long)]
        columns: Option<String>,

        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Print projected rows as JSON lines until N snapshots or Ctrl+C
    Watch {
        /// Topic to watch: cpu, memory, processes
        topic: String,

        /// Stop after this many snapshots (default: until Ctrl+C)
        #[arg(long)]
        count: Option<u64>,

        /// Projection: live (latest snapshot) or history (full windows)
        #[arg(long, default_value = "live", value_parser = ["live", "history"])]
        mode: String,

        /// Sort key: provider, cpu, memory, name, id
        #[arg(long)]
        sort: Option<String>,

        /// Sort direction: asc or desc (default depends on the key)
        #[arg(long)]
        dir: Option<String>,

        /// Case-insensitive substring filter over name, executable and id
        #[arg(long)]
        filter: Option<String>,

        /// Comma-separated visible columns
        #[arg(long)]
        columns: Option<String>,

        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Show one-shot host information
    Info {
        /// What to show: system or cpu
        #[arg(default_value = "system", value_parser = ["system", "cpu"])]
        kind: String,

        /// Print JSON instead of aligned text
        #[arg(long)]
        json: bool,
    },

    /// Send SIGTERM to a process
    Kill {
        /// Process id
        pid: u32,
    },

    /// Serve projected views over HTTP
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8042")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        stream: StreamArgs,
    },
}

/// Logs go to stderr. The dashboard draws on the same terminal, so it stays
/// silent unless `--verbose` or `RUST_LOG` asks otherwise.
fn init_logging(verbose: bool, drawing: bool) {
    let default_level = match (verbose, drawing) {
        (true, _) => "debug",
        (false, true) => "off",
        (false, false) => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Commands::Monitor { .. }));

    match cli.command {
        Commands::Monitor {
            topic,
            columns,
            stream,
        } => commands::monitor::run(&topic, columns.as_deref(), &stream),
        Commands::Watch {
            topic,
            count,
            mode,
            sort,
            dir,
            filter,
            columns,
            stream,
        } => commands::watch::run(commands::watch::WatchCommandConfig {
            topic: &topic,
            count,
            mode: &mode,
            sort: sort.as_deref(),
            direction: dir.as_deref(),
            filter: filter.as_deref(),
            columns: columns.as_deref(),
            stream: &stream,
        }),
        Commands::Info { kind, json } => commands::info::run(&kind, json),
        Commands::Kill { pid } => commands::kill::run(pid),
        Commands::Serve { port, host, stream } => commands::serve::run(&host, port, &stream),
    }
}
