pub mod book;
pub mod borrow;

pub use book::{Book, BookUpdate, Genre, NewBook};
pub use borrow::{BorrowSummary, BorrowedBook, NewBorrow};
