//! Services Layer
//!
//! Catalog commands: validate the input, then call the client.

pub mod book_service;
pub mod borrow_service;

// Re-export for convenience
pub use book_service::{
    add_book, catalog_stats, edit_book, remove_book, validate_new_book, BookForm, CatalogStats,
};
pub use borrow_service::{borrow_book, validate_borrow};
