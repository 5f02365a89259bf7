pub mod books;

use bookshelf_kernel::ModuleRegistry;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, books: books::BooksState) -> anyhow::Result<()> {
    registry.register(books::create_module(books))
}
