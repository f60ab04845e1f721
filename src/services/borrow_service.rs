//! Borrow Service - Quantity guard in front of the borrow command

use chrono::NaiveDate;

use crate::client::CatalogClient;
use crate::domain::CatalogError;
use crate::models::{Book, NewBorrow};

/// Reject quantities the book cannot satisfy, checked against its cached `copies`
pub fn validate_borrow(book: &Book, quantity: u32) -> Result<(), CatalogError> {
    if quantity == 0 {
        return Err(CatalogError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }
    if quantity > book.copies {
        return Err(CatalogError::Validation(format!(
            "quantity {} exceeds available copies ({})",
            quantity, book.copies
        )));
    }
    Ok(())
}

pub async fn borrow_book(
    client: &CatalogClient,
    book: &Book,
    quantity: u32,
    due_date: NaiveDate,
) -> Result<(), CatalogError> {
    validate_borrow(book, quantity)?;
    tracing::info!(
        "Borrowing {} x '{}' until {}",
        quantity,
        book.title,
        due_date
    );

    client
        .create_borrow(&NewBorrow {
            book: book.id.clone(),
            quantity,
            due_date,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::MemoryBackend;
    use std::time::Duration;

    fn due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn test_quantity_bounds() {
        let backend = MemoryBackend::new();
        let book = backend.seed("Dune", "Herbert", "111", 3);

        assert!(validate_borrow(&book, 1).is_ok());
        assert!(validate_borrow(&book, 3).is_ok());
        assert!(validate_borrow(&book, 0).unwrap_err().is_validation());
        for quantity in 4..20 {
            assert!(validate_borrow(&book, quantity).unwrap_err().is_validation());
        }
    }

    #[tokio::test]
    async fn test_excess_quantity_never_reaches_backend() {
        let backend = MemoryBackend::new();
        let book = backend.seed("Dune", "Herbert", "111", 3);
        let client = CatalogClient::with_transport(backend.clone(), Duration::from_secs(30)).unwrap();

        let err = borrow_book(&client, &book, 4, due()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_borrow_shows_in_summary() {
        let backend = MemoryBackend::new();
        let book = backend.seed("Dune", "Herbert", "111", 3);
        let client = CatalogClient::with_transport(backend.clone(), Duration::from_secs(30)).unwrap();

        borrow_book(&client, &book, 2, due()).await.unwrap();
        borrow_book(&client, &book, 1, due()).await.unwrap();

        let rows = client.borrow_summary().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_quantity, 3);
    }
}
