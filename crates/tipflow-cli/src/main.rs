use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tipflow",
    about = "tipflow: liquid transfer scheduling for pipetting robots",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a run and print the ordered action list.
    Plan {
        /// Run configuration file
        #[arg(short, long, default_value = "run.toml")]
        config: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Write the destination → source layout as JSON to this path
        #[arg(long)]
        layout_out: Option<String>,
        /// Acknowledge tip rack replacements without waiting for input
        #[arg(long)]
        auto_ack: bool,
    },
    /// Generate a run.toml scaffold
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Run name written into the scaffold
        #[arg(short, long, default_value = "my-run")]
        name: String,
    },
    /// List the built-in labware catalog
    Labware,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tipflow=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { config, format, layout_out, auto_ack } => {
            commands::plan::plan(&config, &format, layout_out.as_deref(), auto_ack)
        }
        Commands::Init { path, name } => commands::init::init(&path, &name),
        Commands::Labware => commands::labware::list(),
    }
}
