//! Provider construction strategies for each backend.

use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;

use esbench_backends::{MemoryProvider, SqliteProvider};
use esbench_core::{ProviderStrategy, Result, SharedProvider};

use crate::args::{Args, Backend};

/// Ways of obtaining the provider selected on the command line, in order.
pub fn strategies(args: &Args) -> Vec<ProviderStrategy> {
    let strategy: ProviderStrategy = match args.backend {
        Backend::Memory => Box::new(|| memory().boxed()),
        Backend::Sqlite => {
            let path = args.sqlite_path.clone();
            Box::new(move || sqlite(path).boxed())
        }
        Backend::Postgres => {
            let url = args.resolve_database_url();
            Box::new(move || postgres(url).boxed())
        }
    };
    vec![strategy]
}

async fn memory() -> Result<Option<SharedProvider>> {
    let provider: SharedProvider = Arc::new(MemoryProvider::new());
    Ok(Some(provider))
}

async fn sqlite(path: Option<PathBuf>) -> Result<Option<SharedProvider>> {
    let provider = match path {
        Some(path) => SqliteProvider::open(path)?,
        None => SqliteProvider::open_in_memory()?,
    };
    let provider: SharedProvider = Arc::new(provider);
    Ok(Some(provider))
}

/// `Ok(None)` when no connection string is configured.
#[cfg(feature = "postgres")]
async fn postgres(database_url: Option<String>) -> Result<Option<SharedProvider>> {
    let Some(url) = database_url else {
        return Ok(None);
    };
    let provider: SharedProvider =
        Arc::new(esbench_backends::PostgresProvider::connect(&url).await?);
    Ok(Some(provider))
}

#[cfg(not(feature = "postgres"))]
async fn postgres(_database_url: Option<String>) -> Result<Option<SharedProvider>> {
    Err(esbench_core::Error::Config(
        "esbench was built without the `postgres` feature".into(),
    ))
}
