//! Process-wide set of books

use std::collections::HashMap;
use std::sync::Arc;

use common::BookId;
use config::SimplexConfig;
use settlement::Escrow;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::OrderBookEngine;
use crate::error::{MatchingError, Result};
use crate::reconcile::ReconciliationWorker;

/// Every configured book, keyed by id
///
/// Books are created once at startup and live as long as the process.
pub struct BookRegistry {
    books: HashMap<BookId, Arc<OrderBookEngine>>,
    default_book: Option<BookId>,
}

impl BookRegistry {
    pub fn from_config(config: &SimplexConfig, escrow: Arc<dyn Escrow>) -> Self {
        let books = config
            .books
            .iter()
            .map(|book| {
                let engine = OrderBookEngine::new(
                    book,
                    config.matching.settlement_failure_policy,
                    escrow.clone(),
                );
                (book.id.clone(), Arc::new(engine))
            })
            .collect::<HashMap<_, _>>();
        info!(books = books.len(), "Book registry initialized");
        Self {
            books,
            default_book: config.default_book.clone(),
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<OrderBookEngine>> {
        self.books
            .get(id)
            .cloned()
            .ok_or_else(|| MatchingError::BookNotFound(id.to_string()))
    }

    /// The book that requests without an id fall back to
    pub fn default_book(&self) -> Option<&BookId> {
        self.default_book.as_ref()
    }

    pub fn book_ids(&self) -> Vec<BookId> {
        let mut ids: Vec<_> = self.books.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn books(&self) -> impl Iterator<Item = &Arc<OrderBookEngine>> {
        self.books.values()
    }

    /// Start one reconciliation worker per book
    pub fn spawn_reconcilers(
        &self,
        config: &config::ReconciliationConfig,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        self.books
            .values()
            .map(|engine| {
                let worker = ReconciliationWorker::new(engine.clone(), config.clone());
                let token = shutdown.child_token();
                tokio::spawn(async move { worker.run(token).await })
            })
            .collect()
    }

    /// Close every book's notifier; pending waiters fail with `NotifierClosed`
    pub fn shutdown(&self) {
        for engine in self.books.values() {
            engine.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use settlement::InMemoryEscrow;

    fn registry() -> BookRegistry {
        BookRegistry::from_config(&config::generate_default_config(), Arc::new(InMemoryEscrow::new()))
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert_eq!(registry.book_ids(), vec!["simoleans-moola".to_string()]);
        assert_eq!(registry.default_book().map(String::as_str), Some("simoleans-moola"));
        assert!(registry.get("simoleans-moola").is_ok());
        assert_matches!(registry.get("nope"), Err(MatchingError::BookNotFound(id)) if id == "nope");
    }

    #[tokio::test]
    async fn test_shutdown_closes_books() {
        let registry = registry();
        let engine = registry.get("simoleans-moola").unwrap();

        registry.shutdown();
        assert_matches!(engine.await_change(engine.version()).await, Err(MatchingError::NotifierClosed));
    }
}
