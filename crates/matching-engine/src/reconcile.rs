//! Background reconciliation of books against escrow
//!
//! Orders can leave escrow without trading (the owner withdrew them). The
//! [`ReconciliationWorker`] notices and moves them to history as cancelled.
//! It wakes on the escrow's exit events when the escrow offers them, and on
//! a fixed interval regardless, so `interval_seconds` bounds how long a
//! withdrawn order can linger in the book.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use config::ReconciliationConfig;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::OrderBookEngine;
use crate::error::Result;

pub struct ReconciliationWorker {
    engine: Arc<OrderBookEngine>,
    config: ReconciliationConfig,
}

/// Next exit event, or never if the escrow does not publish them
async fn next_exit(exits: &mut Option<broadcast::Receiver<OrderId>>) -> std::result::Result<OrderId, RecvError> {
    match exits {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

impl ReconciliationWorker {
    pub fn new(engine: Arc<OrderBookEngine>, config: ReconciliationConfig) -> Self {
        Self { engine, config }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let book = self.engine.book_id().clone();
        if !self.config.enabled {
            info!(%book, "Reconciliation disabled");
            return;
        }
        info!(
            %book,
            interval_seconds = self.config.interval_seconds,
            run_on_startup = self.config.run_on_startup,
            "Starting reconciliation worker"
        );

        let mut exits = self.engine.escrow().exit_events();

        if self.config.run_on_startup {
            if let Err(e) = self.run_cycle().await {
                error!(%book, %e, "Initial reconciliation failed");
            }
        }

        let mut timer = tokio::time::interval(Duration::from_secs(self.config.interval_seconds.max(1)));
        timer.tick().await; // Skip first tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(%book, "Reconciliation worker shutting down");
                    return;
                }
                _ = timer.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(%book, %e, "Reconciliation failed");
                    }
                }
                exit = next_exit(&mut exits) => match exit {
                    Ok(order_id) => {
                        if self.engine.is_resting(&order_id) {
                            debug!(%book, %order_id, "Exit event for resting order");
                            if let Err(e) = self.run_cycle().await {
                                error!(%book, %e, "Reconciliation failed");
                            }
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(%book, missed, "Missed exit events, reconciling");
                        if let Err(e) = self.run_cycle().await {
                            error!(%book, %e, "Reconciliation failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!(%book, "Exit events closed, falling back to polling");
                        exits = None;
                    }
                },
            }
        }
    }

    /// One reconciliation pass
    #[instrument(skip(self), fields(book = %self.engine.book_id()))]
    pub async fn run_cycle(&self) -> Result<usize> {
        let cancelled = self.engine.reconcile().await?;
        if cancelled > 0 {
            info!(cancelled, "Reconciliation cancelled withdrawn orders");
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Brand, BrandedAmount, OrderState, Proposal};
    use config::{BookConfig, PairSideConfig, SettlementFailurePolicy};
    use settlement::{Escrow, InMemoryEscrow, OfferStatuses, SettlementReceipt, SettlementRequest};

    /// Escrow that can only be polled
    struct PollOnly(Arc<InMemoryEscrow>);

    #[async_trait]
    impl Escrow for PollOnly {
        async fn offer_statuses(&self, ids: &[OrderId]) -> settlement::Result<OfferStatuses> {
            self.0.offer_statuses(ids).await
        }

        async fn settle_trade(&self, request: SettlementRequest) -> settlement::Result<SettlementReceipt> {
            self.0.settle_trade(request).await
        }

        async fn reject_order(&self, order_id: OrderId, reason: &str) -> settlement::Result<()> {
            self.0.reject_order(order_id, reason).await
        }
    }

    fn book_config() -> BookConfig {
        BookConfig {
            id: "simoleans-moola".to_string(),
            asset: PairSideConfig {
                keyword: "Asset".to_string(),
                brand: "simoleans".to_string(),
                label: None,
            },
            price: PairSideConfig {
                keyword: "Price".to_string(),
                brand: "moola".to_string(),
                label: None,
            },
        }
    }

    fn sell() -> Proposal {
        Proposal::sell(
            BrandedAmount::new(Brand::new("simoleans"), 9u64),
            BrandedAmount::new(Brand::new("moola"), 5u64),
        )
    }

    fn config(interval_seconds: u64) -> ReconciliationConfig {
        ReconciliationConfig {
            enabled: true,
            interval_seconds,
            run_on_startup: false,
        }
    }

    async fn settle_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn sell_history_states(engine: &OrderBookEngine) -> Vec<OrderState> {
        engine.current().value.sell_history.iter().map(|o| o.state).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_cancels_withdrawn_order() {
        let inner = Arc::new(InMemoryEscrow::new());
        let engine = Arc::new(OrderBookEngine::new(
            &book_config(),
            SettlementFailurePolicy::KeepResting,
            Arc::new(PollOnly(inner.clone())),
        ));
        let id = OrderId::new();
        engine.submit(sell(), Some(id)).await.unwrap();

        let token = CancellationToken::new();
        let worker = ReconciliationWorker::new(engine.clone(), config(4));
        let handle = tokio::spawn({
            let token = token.clone();
            async move { worker.run(token).await }
        });
        settle_tasks().await;

        inner.withdraw(id);
        tokio::time::advance(Duration::from_secs(1)).await;
        settle_tasks().await;
        assert!(engine.is_resting(&id), "polling only runs on the interval");

        tokio::time::advance(Duration::from_secs(4)).await;
        settle_tasks().await;
        assert_eq!(sell_history_states(&engine), vec![OrderState::Cancelled]);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_event_wakes_worker() {
        let escrow = Arc::new(InMemoryEscrow::new());
        let engine = Arc::new(OrderBookEngine::new(
            &book_config(),
            SettlementFailurePolicy::KeepResting,
            escrow.clone(),
        ));
        let id = OrderId::new();
        engine.submit(sell(), Some(id)).await.unwrap();

        let token = CancellationToken::new();
        let worker = ReconciliationWorker::new(engine.clone(), config(3600));
        let handle = tokio::spawn({
            let token = token.clone();
            async move { worker.run(token).await }
        });
        settle_tasks().await;

        escrow.withdraw(id);
        settle_tasks().await;

        assert!(!engine.is_resting(&id));
        assert_eq!(sell_history_states(&engine), vec![OrderState::Cancelled]);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_worker_returns() {
        let escrow = Arc::new(InMemoryEscrow::new());
        let engine = Arc::new(OrderBookEngine::new(
            &book_config(),
            SettlementFailurePolicy::KeepResting,
            escrow,
        ));
        let worker = ReconciliationWorker::new(
            engine,
            ReconciliationConfig {
                enabled: false,
                ..config(4)
            },
        );
        worker.run(CancellationToken::new()).await;
    }
}
