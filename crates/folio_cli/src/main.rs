//! Inspection entry point for a Folio database.
//!
//! Usage: `folio_cli [config.json]`. Without a config the database is
//! in-memory and caching is disabled.

use folio_core::{
    core_version, init_logging, open_db, open_db_in_memory, Condition, CoreConfig, EntityKind,
    InvalidationGate, MemoryCacheStore, RepositoryProvider,
};
use log::error;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_exit module=cli status=error error={message}");
            eprintln!("folio_cli: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    println!("folio_core version={}", core_version());

    let config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::load(&path).map_err(|err| err.to_string())?,
        None => CoreConfig::default(),
    };
    init_logging(&config.logging)?;

    let conn = match &config.database_path {
        Some(path) => open_db(path),
        None => open_db_in_memory(),
    }
    .map_err(|err| err.to_string())?;

    let provider = RepositoryProvider::new(
        &conn,
        &config.cache,
        Arc::new(MemoryCacheStore::with_capacity(config.cache.capacity_non_zero())),
        Arc::new(InvalidationGate::new()),
    );
    println!(
        "cache={}",
        if provider.cache_enabled() { "enabled" } else { "disabled" }
    );

    for kind in EntityKind::BUILTIN {
        let repo = provider.repository(*kind).map_err(|err| err.to_string())?;
        let live = repo.count(&Condition::all()).map_err(|err| err.to_string())?;
        println!("{} live={live}", kind.name);
    }
    Ok(())
}
