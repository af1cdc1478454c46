mod cli;
mod cli_ops;
mod commands;
mod config;
mod db;
mod domain;
mod editor;
mod prompt;
mod readiness;
mod reindex;
mod store;
mod timestamp;
mod ui;

use std::io;

use tracing_subscriber::EnvFilter;

use commands::CommandError;

const LOG_ENV: &str = "PEONY_LOG";

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(err.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn run() -> Result<(), CommandError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    if let Commands::Config(args) = &cli.command {
        return commands::run_config(args);
    }

    let db_path = match cli.db.as_deref() {
        Some(path) => path.to_string(),
        None => config::default_db_path()?.display().to_string(),
    };
    let settings = commands::load_settings();
    tracing::debug!(db = %db_path, "opening store");
    let mut store = store::Store::open(&db_path, settings.settle)?;

    if !matches!(cli.command, Commands::Add(_) | Commands::Tend(_)) {
        commands::maybe_print_tend_notice(&mut store);
    }

    let mut input = io::stdin().lock();
    match &cli.command {
        Commands::Add(args) => commands::run_add(&mut store, args, &mut input),
        Commands::View(args) => commands::run_view(&mut store, args),
        Commands::Tend(args) => commands::run_tend(&mut store, args, &settings.config, &mut input),
        Commands::Release(args) => commands::run_release(&mut store, args, &mut input),
        Commands::Evolve(args) => commands::run_evolve(&mut store, args),
        Commands::Annotate(args) => commands::run_annotate(&mut store, args),
        Commands::Reindex => commands::run_reindex(&mut store),
        Commands::Config(_) => unreachable!("config is handled before the store is opened"),
    }
}
