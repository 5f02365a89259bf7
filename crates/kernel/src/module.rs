use async_trait::async_trait;
use axum::Router;

/// What a module sees of the application while it starts up.
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// Index a module needs on one of its collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: &'static str,
    /// Field name and direction (`1` ascending, `-1` descending), in key order.
    pub keys: &'static [(&'static str, i32)],
    pub unique: bool,
}

/// An index migration, applied once and recorded by id.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: &'static str,
    pub collection: &'static str,
    pub index: IndexDefinition,
}

/// A feature area mounted under `/api/{name}`.
#[async_trait]
pub trait Module: Sync + Send {
    /// Mount name; must be unique within a registry.
    fn name(&self) -> &'static str;

    /// Prepare local resources (directories, caches). Runs before migrations.
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Routes relative to the mount point.
    fn routes(&self) -> Router {
        Router::new()
    }

    /// OpenAPI fragment with `paths` relative to the mount point and any
    /// `components.schemas` the paths reference.
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![]
    }

    /// Runs once the indexes exist, before the listener is bound.
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after the server has drained.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
