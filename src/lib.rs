//! Bookshelf application library
//!
//! The `books` module plus the bootstrap that wires it to settings, the
//! book store and the HTTP server.

pub mod app;
pub mod modules;

pub use modules::books;
