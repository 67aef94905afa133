use clap::{Parser, Subcommand};
use converge_cli::cmd::{self, stack::StackSubcommand};

#[derive(Parser)]
#[command(
    name = "jenkinsctl",
    about = "Unattended, re-runnable Jenkins installer: converge a host to a running Jenkins on a fixed port",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge this host: packages, port config, wizard off, service running
    Install {
        /// Port Jenkins binds to
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Leave the first-run setup wizard enabled
        #[arg(long)]
        keep_wizard: bool,

        /// Override platform detection (linux, windows)
        #[arg(long)]
        platform: Option<String>,

        /// Skip the post-install readiness poll
        #[arg(long)]
        no_verify: bool,

        /// How long to wait for Jenkins to answer after convergence
        #[arg(long, default_value = "60")]
        timeout_seconds: u64,
    },

    /// Probe current state and show what install would do (no changes)
    Plan {
        #[arg(long, default_value = "8000")]
        port: u16,

        #[arg(long)]
        keep_wizard: bool,

        #[arg(long)]
        platform: Option<String>,
    },

    /// Check the externally visible end-state: HTTP 2xx/403 on the port
    Validate {
        #[arg(long, default_value = "localhost")]
        host: String,

        #[arg(long, default_value = "8000")]
        port: u16,

        #[arg(long, default_value = "60")]
        timeout_seconds: u64,
    },

    /// Manage the cloud-template deployment track
    Stack {
        #[command(subcommand)]
        subcommand: StackSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Install {
            port,
            keep_wizard,
            platform,
            no_verify,
            timeout_seconds,
        } => cmd::install::run(
            port,
            keep_wizard,
            platform.as_deref(),
            no_verify,
            timeout_seconds,
            cli.json,
        ),
        Commands::Plan {
            port,
            keep_wizard,
            platform,
        } => cmd::plan::run(port, keep_wizard, platform.as_deref(), cli.json),
        Commands::Validate {
            host,
            port,
            timeout_seconds,
        } => cmd::validate::run(&host, port, timeout_seconds, cli.json),
        Commands::Stack { subcommand } => cmd::stack::run(subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
