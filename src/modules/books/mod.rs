pub mod handlers;
pub mod models;
pub mod store;
pub mod upload;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch},
    Router,
};
use bookshelf_kernel::{IndexDefinition, InitCtx, Migration, Module};

pub use handlers::BooksState;

/// Slack on top of the file limit for multipart framing and other parts.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Book catalogue: CRUD over the book store plus cover uploads.
pub struct BooksModule {
    state: BooksState,
}

impl BooksModule {
    pub fn new(state: BooksState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        self.state.covers.ensure_dir().await?;

        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            upload_dir = %self.state.covers.dir().display(),
            isbn_rule = ?ctx.settings.validation.isbn,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        let upload_limit = self.state.covers.max_bytes() + MULTIPART_OVERHEAD_BYTES;

        Router::new()
            .route("/", get(handlers::list_books).post(handlers::create_book))
            .route(
                "/{id}",
                get(handlers::get_book)
                    .put(handlers::update_book)
                    .delete(handlers::delete_book),
            )
            .route(
                "/cover-image/{id}",
                patch(handlers::update_book_cover).layer(DefaultBodyLimit::max(upload_limit)),
            )
            .with_state(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![
            Migration {
                id: "001_isbn_unique",
                collection: store::COLLECTION,
                index: IndexDefinition {
                    name: "books_isbn_unique",
                    keys: &[("isbn", 1)],
                    unique: true,
                },
            },
            Migration {
                id: "002_created_at",
                collection: store::COLLECTION,
                index: IndexDefinition {
                    name: "books_created_at",
                    keys: &[("createdAt", 1), ("_id", 1)],
                    unique: false,
                },
            },
        ]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(state: BooksState) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(state))
}

fn json_response(description: &str, schema: &str) -> serde_json::Value {
    serde_json::json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": format!("#/components/schemas/{}", schema) }
            }
        }
    })
}

fn book_response(description: &str) -> serde_json::Value {
    json_response(description, "Book")
}

fn id_parameter() -> serde_json::Value {
    serde_json::json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "string" },
        "description": "Book id (24 hexadecimal characters)"
    })
}

fn openapi_fragment() -> serde_json::Value {
    let not_found = json_response("Book not found", "MessageResponse");
    let invalid = json_response("Invalid input", "ValidationErrorResponse");
    let bad_request = json_response("Malformed request", "MessageResponse");
    let internal = json_response("Store failure", "ErrorResponse");

    serde_json::json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books",
                    "tags": ["Books"],
                    "parameters": [
                        { "name": "page", "in": "query", "schema": { "type": "integer", "minimum": 1, "default": 1 } },
                        { "name": "limit", "in": "query", "schema": { "type": "integer", "minimum": 1, "default": 10 } }
                    ],
                    "responses": {
                        "200": {
                            "description": "Books in creation order",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            }
                        },
                        "400": bad_request,
                        "500": internal
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/CreateBook" }
                            }
                        }
                    },
                    "responses": {
                        "201": book_response("Created book"),
                        "400": invalid,
                        "500": internal
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": book_response("The book"),
                        "404": not_found,
                        "500": internal
                    }
                },
                "put": {
                    "summary": "Update a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/UpdateBook" }
                            }
                        }
                    },
                    "responses": {
                        "200": book_response("Updated book"),
                        "400": invalid,
                        "404": not_found,
                        "500": internal
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": json_response("Book deleted", "MessageResponse"),
                        "404": not_found,
                        "500": internal
                    }
                }
            },
            "/cover-image/{id}": {
                "patch": {
                    "summary": "Upload a cover image",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "multipart/form-data": {
                                "schema": {
                                    "type": "object",
                                    "properties": {
                                        "coverImage": { "type": "string", "format": "binary" }
                                    },
                                    "required": ["coverImage"]
                                }
                            }
                        }
                    },
                    "responses": {
                        "200": book_response("Book with its new cover"),
                        "400": invalid,
                        "404": not_found,
                        "413": bad_request,
                        "500": internal
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "publishedDate": { "type": "string", "format": "date-time" },
                        "isbn": { "type": "string", "minLength": 10, "maxLength": 13 },
                        "coverImage": { "type": "string" },
                        "createdAt": { "type": "string", "format": "date-time" },
                        "updatedAt": { "type": "string", "format": "date-time" }
                    },
                    "required": ["id", "title", "author", "publishedDate", "isbn", "createdAt", "updatedAt"]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "publishedDate": { "type": "string", "description": "ISO-8601 date" },
                        "isbn": { "type": "string" },
                        "coverImage": { "type": "string" }
                    },
                    "required": ["title", "author", "publishedDate", "isbn"]
                },
                "UpdateBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "type": "string" },
                        "publishedDate": { "type": "string", "description": "ISO-8601 date" },
                        "isbn": { "type": "string" },
                        "coverImage": { "type": "string" }
                    }
                }
            }
        }
    })
}
