//! Book Service - Form validation and book commands
//!
//! Validation runs before the client is called; an invalid form never produces a request.

use crate::client::CatalogClient;
use crate::domain::CatalogError;
use crate::models::{Book, BookUpdate, Genre, NewBook};

/// Book form as entered by a user
#[derive(Debug, Clone, PartialEq)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub genre: Genre,
    pub isbn: String,
    pub description: String,
    pub copies: u32,
}

impl Default for BookForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            genre: Genre::Fiction,
            isbn: String::new(),
            description: String::new(),
            copies: 1,
        }
    }
}

impl BookForm {
    fn into_new_book(self) -> NewBook {
        let available = self.copies > 0;
        NewBook {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            genre: self.genre,
            isbn: self.isbn.trim().to_string(),
            description: self.description,
            copies: self.copies,
            available,
        }
    }
}

/// Figures for the catalog overview panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub total_titles: usize,
    /// Titles with at least one copy on the shelf
    pub available_titles: usize,
    pub total_copies: u64,
}

fn require(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_fields(title: &str, author: &str, isbn: &str) -> Result<(), CatalogError> {
    require("title", title)?;
    require("author", author)?;
    require("isbn", isbn)
}

pub fn validate_new_book(form: &BookForm) -> Result<(), CatalogError> {
    require_fields(&form.title, &form.author, &form.isbn)
}

/// Validate and create. `available` is derived here, once, from `copies > 0`.
pub async fn add_book(client: &CatalogClient, form: BookForm) -> Result<Book, CatalogError> {
    validate_new_book(&form)?;
    let new_book = form.into_new_book();
    tracing::info!("Adding book '{}' ({} copies)", new_book.title, new_book.copies);
    client.create_book(&new_book).await
}

/// Submit an edited book. `available` is never sent, so it keeps its creation value.
pub async fn edit_book(client: &CatalogClient, book: &Book) -> Result<Book, CatalogError> {
    require_fields(&book.title, &book.author, &book.isbn)?;
    let updates = BookUpdate {
        title: Some(book.title.trim().to_string()),
        author: Some(book.author.trim().to_string()),
        isbn: Some(book.isbn.trim().to_string()),
        ..BookUpdate::editable_fields(book)
    };
    tracing::info!("Updating book {}", book.id);
    client.update_book(&book.id, &updates).await
}

pub async fn remove_book(client: &CatalogClient, book: &Book) -> Result<(), CatalogError> {
    tracing::info!("Deleting book {} ('{}')", book.id, book.title);
    client.delete_book(&book.id).await
}

pub fn catalog_stats(books: &[Book]) -> CatalogStats {
    CatalogStats {
        total_titles: books.len(),
        available_titles: books.iter().filter(|b| b.copies > 0).count(),
        total_copies: books.iter().map(|b| u64::from(b.copies)).sum(),
    }
}
