//! Operator probe for the workflow engine.
//!
//! Opens (and migrates) a database file, optionally starts file logging,
//! and prints the engine and schema versions.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "pkm_cli")]
#[command(about = "Open a PKM workflow database and report engine and schema versions")]
struct Cli {
    /// SQLite database file; created and migrated when missing
    db_path: PathBuf,

    /// Absolute directory for rolling log files; logging is off when omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error); defaults by build mode
    #[arg(long)]
    log_level: Option<String>,
}

fn run(cli: Cli) -> Result<(), String> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or(pkm_core::default_log_level());
        pkm_core::init_logging(level, log_dir).map_err(|err| err.to_string())?;
    }

    let conn = pkm_core::open_db(&cli.db_path).map_err(|err| err.to_string())?;
    let schema_version = pkm_core::db::migrations::current_user_version(&conn)
        .map_err(|err| err.to_string())?;
    log::info!("event=cli_probe module=cli status=ok schema_version={schema_version}");

    println!("pkm_core ping={}", pkm_core::ping());
    println!("pkm_core version={}", pkm_core::core_version());
    println!(
        "schema version={schema_version} latest={}",
        pkm_core::db::migrations::latest_version()
    );
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
