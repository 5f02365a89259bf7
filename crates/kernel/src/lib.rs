//! Core building blocks shared by every bookshelf crate: layered settings,
//! the `Module` lifecycle trait and the registry that drives it.

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{IndexDefinition, InitCtx, Migration, Module};
pub use registry::ModuleRegistry;
