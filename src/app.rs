//! Application bootstrap shared by the `bookshelf` binary and the CLI.

use std::sync::Arc;

use axum::Router;
use bookshelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use mongodb::Database;

use crate::modules::{
    self,
    books::store::{BookStore, MemoryBookStore, MongoBookStore},
    books::upload::CoverStorage,
    books::validation::BookValidator,
    books::BooksState,
};

/// Database url selecting the in-process store.
pub const MEMORY_URL: &str = "memory://";

/// The book store chosen by `database.url`, plus the MongoDB handle when
/// there is one.
pub struct Persistence {
    pub store: Arc<dyn BookStore>,
    pub database: Option<Database>,
}

/// Open the configured store. Fails when no database url is configured.
pub async fn open_persistence(settings: &Settings) -> anyhow::Result<Persistence> {
    let url = settings.database.require_url()?;

    if url == MEMORY_URL {
        tracing::warn!("using the in-memory book store; data is lost on exit");
        return Ok(Persistence {
            store: Arc::new(MemoryBookStore::new()),
            database: None,
        });
    }

    let database = bookshelf_db::connect(url, &settings.database.name).await?;
    Ok(Persistence {
        store: Arc::new(MongoBookStore::new(&database)),
        database: Some(database),
    })
}

pub fn books_state(settings: &Settings, store: Arc<dyn BookStore>) -> BooksState {
    BooksState {
        store,
        validator: BookValidator::new(settings.validation.isbn),
        covers: CoverStorage::from_settings(&settings.uploads),
    }
}

pub fn build_registry(settings: &Settings, store: Arc<dyn BookStore>) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, books_state(settings, store))?;
    Ok(registry)
}

/// The full HTTP router over `store`, without binding a listener.
pub fn router(settings: &Settings, store: Arc<dyn BookStore>) -> anyhow::Result<Router> {
    let registry = build_registry(settings, store)?;
    Ok(bookshelf_http::build_router(&registry, settings))
}

async fn run_migrations(registry: &ModuleRegistry, database: Option<&Database>) -> anyhow::Result<usize> {
    let migrations = registry.collect_migrations();

    match database {
        Some(database) => bookshelf_db::migrate(database, &migrations).await,
        None => {
            tracing::debug!(count = migrations.len(), "no database configured; migrations skipped");
            Ok(0)
        }
    }
}

/// Apply pending index migrations and exit.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let persistence = open_persistence(settings).await?;
    let registry = build_registry(settings, persistence.store.clone())?;
    run_migrations(&registry, persistence.database.as_ref()).await
}

/// Run the service until a shutdown signal arrives.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let persistence = open_persistence(settings).await?;
    let registry = build_registry(settings, persistence.store.clone())?;
    let ctx = InitCtx { settings };

    registry.init_modules(&ctx).await?;

    let applied = run_migrations(&registry, persistence.database.as_ref()).await?;
    tracing::info!(applied, "migrations complete");

    registry.start_modules(&ctx).await?;

    let served =
        bookshelf_http::start_server(&registry, settings, bookshelf_http::shutdown_signal()).await;
    let stopped = registry.stop_modules().await;

    served?;
    stopped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_database_url_fails_startup() {
        let settings = Settings::default();
        let err = open_persistence(&settings).await.err().unwrap();
        assert!(err.to_string().contains("database url is not configured"));
    }

    #[tokio::test]
    async fn memory_url_selects_in_process_store() {
        let mut settings = Settings::default();
        settings.database.url = Some(MEMORY_URL.to_string());

        let persistence = open_persistence(&settings).await.unwrap();
        assert!(persistence.database.is_none());
        assert_eq!(migrate(&settings).await.unwrap(), 0);
    }

    #[test]
    fn registry_mounts_books() {
        let registry =
            build_registry(&Settings::default(), Arc::new(MemoryBookStore::new())).unwrap();
        assert!(registry.get_module("books").is_some());
        assert_eq!(registry.collect_migrations().len(), 2);
    }
}
