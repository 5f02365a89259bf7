//! MongoDB connection factory and the index migrations modules contribute.

use anyhow::Context;
use bookshelf_kernel::{IndexDefinition, Migration};
use bson::{doc, Document};
use mongodb::{options::ClientOptions, options::IndexOptions, Client, Database, IndexModel};

/// Collection recording which migrations have run.
pub const MIGRATIONS_COLLECTION: &str = "_migrations";

const APP_NAME: &str = "bookshelf";

/// Connect to MongoDB and verify the server answers a ping.
///
/// The database named in the connection string wins over `fallback_name`.
pub async fn connect(url: &str, fallback_name: &str) -> anyhow::Result<Database> {
    let mut options = ClientOptions::parse(url)
        .await
        .context("invalid MongoDB connection string")?;
    options.app_name.get_or_insert_with(|| APP_NAME.to_string());

    let name = options
        .default_database
        .clone()
        .unwrap_or_else(|| fallback_name.to_string());

    let client = Client::with_options(options).context("failed to create MongoDB client")?;
    let database = client.database(&name);

    database
        .run_command(doc! { "ping": 1 })
        .await
        .with_context(|| format!("failed to reach MongoDB database '{}'", name))?;

    tracing::info!(target: "bookshelf-db", database = %name, "connected to MongoDB");
    Ok(database)
}

/// Translate a module's index definition into a MongoDB index model.
pub fn index_model(definition: &IndexDefinition) -> IndexModel {
    let mut keys = Document::new();
    for (field, direction) in definition.keys {
        keys.insert(*field, *direction);
    }

    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(definition.name.to_string())
                .unique(definition.unique)
                .build(),
        )
        .build()
}

/// Apply every migration not yet recorded in [`MIGRATIONS_COLLECTION`].
///
/// Returns how many migrations ran; a second call with the same input
/// applies nothing.
pub async fn migrate(database: &Database, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
    let ledger = database.collection::<Document>(MIGRATIONS_COLLECTION);
    let mut applied = 0;

    for (module, migration) in migrations {
        let key = doc! { "module": module.as_str(), "id": migration.id };

        let already_applied = ledger
            .find_one(key.clone())
            .await
            .with_context(|| format!("failed to read migration ledger for '{}'", module))?
            .is_some();
        if already_applied {
            tracing::debug!(module = %module, migration = migration.id, "migration already applied");
            continue;
        }

        database
            .collection::<Document>(migration.collection)
            .create_index(index_model(&migration.index))
            .await
            .with_context(|| {
                format!(
                    "migration {}/{} failed to create index '{}'",
                    module, migration.id, migration.index.name
                )
            })?;

        let mut record = key;
        record.insert("collection", migration.collection);
        record.insert("applied_at", bson::DateTime::now());
        ledger
            .insert_one(record)
            .await
            .with_context(|| format!("failed to record migration {}/{}", module, migration.id))?;

        tracing::info!(module = %module, migration = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_model_keeps_key_order_and_options() {
        let definition = IndexDefinition {
            name: "books_created_at",
            keys: &[("createdAt", 1), ("_id", 1)],
            unique: false,
        };

        let model = index_model(&definition);
        let fields: Vec<(&str, i32)> = model
            .keys
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_i32().unwrap()))
            .collect();
        assert_eq!(fields, vec![("createdAt", 1), ("_id", 1)]);

        let options = model.options.unwrap();
        assert_eq!(options.name.as_deref(), Some("books_created_at"));
        assert_eq!(options.unique, Some(false));
    }

    #[test]
    fn unique_flag_is_carried_over() {
        let definition = IndexDefinition {
            name: "books_isbn_unique",
            keys: &[("isbn", 1)],
            unique: true,
        };

        let options = index_model(&definition).options.unwrap();
        assert_eq!(options.unique, Some(true));
    }

    #[tokio::test]
    async fn rejects_malformed_connection_string() {
        let err = connect("not-a-mongo-url", "bookshelf").await.unwrap_err();
        assert!(err.to_string().contains("invalid MongoDB connection string"));
    }
}
