use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Borrow command body. Write-only: never read back individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBorrow {
    /// Book identifier
    pub book: String,
    pub quantity: u32,
    pub due_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedBook {
    pub title: String,
    pub isbn: String,
}

/// Server-side aggregate of all borrows of one book
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowSummary {
    pub book: BorrowedBook,
    pub total_quantity: u32,
}

impl BorrowSummary {
    pub fn title(&self) -> &str {
        &self.book.title
    }

    /// Display key; assumed unique among summary rows
    pub fn isbn(&self) -> &str {
        &self.book.isbn
    }
}
