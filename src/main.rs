use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_catalog::client::{ListBooks, ListBorrowSummary};
use library_catalog::models::{Book, BorrowSummary};
use library_catalog::services::catalog_stats;
use library_catalog::{config, CatalogClient, CatalogError, LifecycleEvent};

fn print_books(books: &[Book]) {
    let stats = catalog_stats(books);
    tracing::info!(
        "📚 {} titles, {} available, {} copies",
        stats.total_titles,
        stats.available_titles,
        stats.total_copies
    );
    for book in books {
        tracing::info!(
            "  {} | {} | {} | ISBN {} | {} copies{}",
            book.title,
            book.author,
            book.genre,
            book.isbn,
            book.copies,
            if book.available { "" } else { " (unavailable)" }
        );
    }
}

fn print_summary(rows: &[BorrowSummary]) {
    if rows.is_empty() {
        tracing::info!("No borrowed books yet.");
        return;
    }
    for row in rows {
        tracing::info!(
            "  {} | ISBN {} | {} borrowed",
            row.title(),
            row.isbn(),
            row.total_quantity
        );
    }
}

async fn print_once(client: &CatalogClient) -> Result<(), CatalogError> {
    let (books, summary) = tokio::join!(client.list_books(), client.borrow_summary());
    print_books(&books?);
    print_summary(&summary?);
    Ok(())
}

/// Mount live observers and log every change until `shutdown` resolves.
/// A line of input is forwarded as a focus event, `r` as a reconnect.
async fn watch<R>(
    client: &CatalogClient,
    input: R,
    shutdown: impl Future<Output = ()>,
) -> Result<(), CatalogError>
where
    R: AsyncBufRead + Unpin,
{
    let mut books = client.watch::<ListBooks>(client.live_options())?;
    let mut summary = client.watch::<ListBorrowSummary>(client.live_options())?;
    let mut stdin = input.lines();
    let mut stdin_open = true;
    // Pinned once so a signal arriving between iterations is not lost
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            state = books.changed() => {
                let state = state?;
                if let Some(err) = &state.error {
                    tracing::warn!("Book list refresh failed: {}", err);
                } else if let (false, Some(data)) = (state.is_fetching, &state.data) {
                    print_books(data);
                }
            }
            state = summary.changed() => {
                let state = state?;
                if let Some(err) = &state.error {
                    tracing::warn!("Borrow summary refresh failed: {}", err);
                } else if let (false, Some(data)) = (state.is_fetching, &state.data) {
                    print_summary(data);
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim() == "r" => client.notify(LifecycleEvent::Reconnect),
                    Ok(Some(_)) => client.notify(LifecycleEvent::Focus),
                    // stdin closed; polling carries on
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_catalog=debug,catalog_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();
    let once = std::env::args().any(|arg| arg == "--once");

    let client = match CatalogClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to start catalog client: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Catalog backend {} (polling every {:?})",
        config.api_url,
        client.poll_interval()
    );

    let result = if once {
        print_once(&client).await
    } else {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        watch(&client, BufReader::new(tokio::io::stdin()), ctrl_c).await
    };
    client.shutdown();

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
