use anyhow::Context;
use bookshelf_kernel::settings::Settings;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bookshelf-cli", version, about = "Operate the bookshelf service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server until SIGINT or SIGTERM.
    Serve,
    /// Apply pending index migrations and exit.
    Migrate,
    /// Load and validate settings without connecting to anything.
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load bookshelf settings")?;
    bookshelf_telemetry::init(&settings.telemetry)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    match cli.command {
        Command::Serve => runtime.block_on(bookshelf::app::serve(&settings)),
        Command::Migrate => {
            let applied = runtime.block_on(bookshelf::app::migrate(&settings))?;
            tracing::info!(applied, "migrations applied");
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Command::CheckConfig => check_config(&settings),
    }
}

fn check_config(settings: &Settings) -> anyhow::Result<()> {
    let url = settings.database.require_url()?;
    let backend = if url == bookshelf::app::MEMORY_URL {
        "memory"
    } else {
        "mongodb"
    };

    println!(
        "environment={:?} port={} database={} backend={} uploads={} isbn={:?}",
        settings.environment,
        settings.server.port,
        settings.database.name,
        backend,
        settings.uploads.dir.display(),
        settings.validation.isbn,
    );
    Ok(())
}
