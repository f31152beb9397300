use clap::Parser;
use mimalloc::MiMalloc;
use std::process::ExitCode;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use museo_ops::cli::Cli;
use museo_ops::{Config, Reporter, routines};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };
    cli.apply_overrides(&mut cfg);

    // stdout carries report records only
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .init();

    let routine = cli.command.name();
    info!(
        routine,
        endpoint = %cfg.database.endpoint(),
        user = %cfg.database.user.as_deref().unwrap_or("<unset>"),
        database = %cfg.database.database.as_deref().unwrap_or("<none>"),
        ssl = ?cfg.database.ssl,
        password_set = cfg.database.password.is_some(),
    );

    let mut reporter = Reporter::stdout(cfg.report.format, cfg.report.preview_chars);
    let started = Instant::now();

    let result = routines::run(&cli.command, &cfg, &mut reporter).await;
    ExitCode::from(routines::finish(&mut reporter, routine, result, started.elapsed()))
}
