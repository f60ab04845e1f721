//! In-memory catalog backend used by unit tests

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::CatalogError;
use crate::infrastructure::transport::{ApiRequest, Transport};
use crate::models::{Book, Genre, NewBook};

#[derive(Default)]
struct State {
    books: Vec<Book>,
    /// (book id, quantity)
    borrows: Vec<(String, u32)>,
    next_id: u32,
    failures: VecDeque<(Method, String, CatalogError)>,
    calls: Vec<(Method, String)>,
}

/// Mimics the catalog REST service. Borrows decrement `copies` server-side and
/// updates never touch `available` unless asked to.
#[derive(Default)]
pub(crate) struct MemoryBackend {
    state: Mutex<State>,
    read_latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn seed(&self, title: &str, author: &str, isbn: &str, copies: u32) -> Book {
        let mut state = self.state.lock().unwrap();
        insert_book(
            &mut state,
            NewBook {
                title: title.to_string(),
                author: author.to_string(),
                genre: Genre::Fiction,
                isbn: isbn.to_string(),
                description: String::new(),
                copies,
                available: copies > 0,
            },
        )
    }

    /// Delay applied to GET requests only
    pub(crate) fn set_read_latency(&self, latency: Duration) {
        *self.read_latency.lock().unwrap() = latency;
    }

    /// Next matching request fails with `error`
    pub(crate) fn fail_next(&self, method: Method, path: &str, error: CatalogError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push_back((method, path.to_string(), error));
    }

    pub(crate) fn calls_to(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub(crate) fn max_concurrent_requests(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn book(&self, id: &str) -> Option<Book> {
        let state = self.state.lock().unwrap();
        state.books.iter().find(|b| b.id == id).cloned()
    }

    fn handle(&self, request: &ApiRequest) -> Result<Value, CatalogError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push((request.method.clone(), request.path.clone()));

        if let Some(pos) = state
            .failures
            .iter()
            .position(|(m, p, _)| *m == request.method && *p == request.path)
            && let Some((_, _, error)) = state.failures.remove(pos)
        {
            return Err(error);
        }

        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["books"]) => Ok(json!({ "success": true, "data": state.books })),
            ("POST", ["books"]) => {
                let new_book: NewBook = serde_json::from_value(body(request)?)?;
                let book = insert_book(&mut state, new_book);
                Ok(json!({ "success": true, "data": book }))
            }
            ("PUT", ["books", id]) => {
                let pos = find(&state, id)?;
                let mut merged = serde_json::to_value(&state.books[pos])?;
                if let (Some(target), Value::Object(fields)) = (merged.as_object_mut(), body(request)?)
                {
                    target.extend(fields);
                }
                let mut book: Book = serde_json::from_value(merged)?;
                book.updated_at = Utc::now();
                state.books[pos] = book.clone();
                Ok(json!({ "success": true, "data": book }))
            }
            ("DELETE", ["books", id]) => {
                let pos = find(&state, id)?;
                state.books.remove(pos);
                Ok(json!({ "success": true, "data": null }))
            }
            ("POST", ["borrow"]) => {
                let body = body(request)?;
                let id = body["book"].as_str().unwrap_or_default().to_string();
                let quantity = body["quantity"].as_u64().unwrap_or_default() as u32;
                let pos = find(&state, &id)?;
                let book = &mut state.books[pos];
                if quantity > book.copies {
                    return Err(CatalogError::Status {
                        status: 400,
                        body: "Not enough copies".to_string(),
                    });
                }
                book.copies -= quantity;
                book.available = book.copies > 0;
                state.borrows.push((id, quantity));
                Ok(json!({ "success": true }))
            }
            ("GET", ["borrow"]) => {
                let mut rows: Vec<Value> = Vec::new();
                for book in &state.books {
                    let total: u32 = state
                        .borrows
                        .iter()
                        .filter(|(id, _)| *id == book.id)
                        .map(|(_, q)| q)
                        .sum();
                    if total > 0 {
                        rows.push(json!({
                            "book": { "title": book.title, "isbn": book.isbn },
                            "totalQuantity": total
                        }));
                    }
                }
                Ok(json!({ "success": true, "data": rows }))
            }
            _ => Err(CatalogError::Status {
                status: 404,
                body: "Route not found".to_string(),
            }),
        }
    }
}

fn insert_book(state: &mut State, new_book: NewBook) -> Book {
    state.next_id += 1;
    let now = Utc::now();
    let book = Book {
        id: format!("book-{}", state.next_id),
        title: new_book.title,
        author: new_book.author,
        genre: new_book.genre,
        isbn: new_book.isbn,
        description: new_book.description,
        copies: new_book.copies,
        available: new_book.available,
        created_at: now,
        updated_at: now,
    };
    state.books.push(book.clone());
    book
}

fn find(state: &State, id: &str) -> Result<usize, CatalogError> {
    state
        .books
        .iter()
        .position(|b| b.id == id)
        .ok_or_else(|| CatalogError::Status {
            status: 404,
            body: "Book not found".to_string(),
        })
}

fn body(request: &ApiRequest) -> Result<Value, CatalogError> {
    request
        .body
        .clone()
        .ok_or_else(|| CatalogError::Decode("missing body".to_string()))
}

#[async_trait]
impl Transport for MemoryBackend {
    async fn execute(&self, request: ApiRequest) -> Result<Value, CatalogError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let latency = *self.read_latency.lock().unwrap();
        if request.method == Method::GET && !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let result = self.handle(&request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
