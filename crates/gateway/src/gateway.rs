//! Subscription fan-out
//!
//! Connections subscribe to books. For every book with at least one
//! subscriber a change loop waits on the book's notifier and pushes the
//! public projection of each new version to every subscriber. A subscriber
//! whose connection is gone is pruned without disturbing the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common::{BookId, OrderId, Proposal};
use matching_engine::{
    BookOrdersView, BookRegistry, BookSnapshot, MatchingError, OrderBookEngine, OrderView,
    SubmitOutcome, Versioned,
};
use metrics::{counter, Counter};
use parking_lot::Mutex;
use server::{ConnectionId, Outbound};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{GatewayError, Result};
use crate::protocol::{self, ClientRequest, ServerMessage, SubscribeStatus};

struct Session {
    outbound: Outbound,
    books: HashSet<BookId>,
}

struct Subscriber {
    outbound: Outbound,
    /// Latest version delivered on this connection
    last_version: u64,
}

pub struct Gateway {
    registry: Arc<BookRegistry>,
    sessions: Mutex<HashMap<ConnectionId, Session>>,
    /// Per book, keyed by connection. Initial sends and fan-out both happen
    /// under this lock so a subscriber never sees versions out of order.
    subscribers: Mutex<HashMap<BookId, HashMap<ConnectionId, Subscriber>>>,
    /// Books whose change loop has been started
    loops: Mutex<HashSet<BookId>>,
    shutdown: CancellationToken,
    pushes: Counter,
    pruned: Counter,
}

impl Gateway {
    pub fn new(registry: Arc<BookRegistry>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            loops: Mutex::new(HashSet::new()),
            shutdown,
            pushes: counter!("gateway_pushes_total"),
            pruned: counter!("gateway_subscribers_pruned_total"),
        })
    }

    pub fn registry(&self) -> &Arc<BookRegistry> {
        &self.registry
    }

    /// Resolve the book a request targets
    ///
    /// With a pinned default book, requests without an id use it and
    /// requests naming any other book are refused.
    pub fn coerce_book(&self, requested: Option<&str>) -> Result<Arc<OrderBookEngine>> {
        let id = match (requested, self.registry.default_book()) {
            (Some(requested), Some(pinned)) if requested != pinned.as_str() => {
                return Err(GatewayError::BookMismatch {
                    requested: requested.to_string(),
                    pinned: pinned.clone(),
                })
            }
            (Some(requested), _) => requested,
            (None, Some(pinned)) => pinned.as_str(),
            (None, None) => return Err(GatewayError::MissingBook),
        };
        Ok(self.registry.get(id)?)
    }

    /// Register a connection so it can subscribe
    pub fn open_session(&self, conn_id: ConnectionId, outbound: Outbound) {
        self.sessions.lock().insert(
            conn_id,
            Session {
                outbound,
                books: HashSet::new(),
            },
        );
        debug!(conn_id, "Session opened");
    }

    /// Forget a connection and every subscription it held
    pub fn close_session(&self, conn_id: ConnectionId) {
        let Some(session) = self.sessions.lock().remove(&conn_id) else {
            return;
        };
        let mut subscribers = self.subscribers.lock();
        for book in &session.books {
            if let Some(subs) = subscribers.get_mut(book) {
                subs.remove(&conn_id);
            }
        }
        debug!(conn_id, books = session.books.len(), "Session closed");
    }

    pub fn subscriber_count(&self, book_id: &str) -> usize {
        self.subscribers.lock().get(book_id).map_or(0, HashMap::len)
    }

    fn push_message(book_id: &BookId, view: BookOrdersView) -> Result<Message> {
        ServerMessage::BookOrders {
            book_id: book_id.clone(),
            data: view,
        }
        .to_message()
    }

    /// Follow `engine` on `conn_id`
    ///
    /// A new subscriber is sent the current book right away and every later
    /// version after that. Subscribing twice is harmless and reports
    /// `Already`. If the current book cannot be delivered nothing is
    /// recorded and `ConnectionClosed` is returned.
    #[instrument(skip(self, engine), fields(book = %engine.book_id()))]
    pub fn subscribe(self: &Arc<Self>, conn_id: ConnectionId, engine: &Arc<OrderBookEngine>) -> Result<SubscribeStatus> {
        let book_id = engine.book_id().clone();
        let outbound = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(&conn_id)
                .ok_or(GatewayError::SubscriptionState(conn_id))?;
            if !session.books.insert(book_id.clone()) {
                return Ok(SubscribeStatus::Already);
            }
            session.outbound.clone()
        };

        self.ensure_change_loop(engine);

        let mut subscribers = self.subscribers.lock();
        let current = engine.current();
        let sent = Self::push_message(&book_id, engine.project(&current)).and_then(|message| {
            outbound
                .send(message)
                .map_err(|_| GatewayError::ConnectionClosed(conn_id))
        });
        if let Err(e) = sent {
            drop(subscribers);
            self.forget_book(conn_id, &book_id);
            warn!(conn_id, %e, "Initial book not delivered, subscription dropped");
            return Err(e);
        }
        self.pushes.increment(1);
        subscribers.entry(book_id).or_default().insert(
            conn_id,
            Subscriber {
                outbound,
                last_version: current.version,
            },
        );
        info!(conn_id, version = current.version, "Subscribed");
        Ok(SubscribeStatus::Ok)
    }

    /// Drop `book_id` from the connection's session, if it still has one
    fn forget_book(&self, conn_id: ConnectionId, book_id: &BookId) {
        if let Some(session) = self.sessions.lock().get_mut(&conn_id) {
            session.books.remove(book_id);
        }
    }

    /// Stop following a book; true if the connection was subscribed
    pub fn unsubscribe(&self, conn_id: ConnectionId, book_id: &BookId) -> Result<bool> {
        let was_subscribed = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(&conn_id)
                .ok_or(GatewayError::SubscriptionState(conn_id))?;
            session.books.remove(book_id)
        };
        if let Some(subs) = self.subscribers.lock().get_mut(book_id) {
            subs.remove(&conn_id);
        }
        debug!(conn_id, book = %book_id, was_subscribed, "Unsubscribed");
        Ok(was_subscribed)
    }

    /// Start the book's change loop unless it is already running
    fn ensure_change_loop(self: &Arc<Self>, engine: &Arc<OrderBookEngine>) {
        if !self.loops.lock().insert(engine.book_id().clone()) {
            return;
        }
        let gateway = Arc::clone(self);
        let engine = Arc::clone(engine);
        let since = engine.version();
        tokio::spawn(async move { gateway.change_loop(engine, since).await });
    }

    async fn change_loop(self: Arc<Self>, engine: Arc<OrderBookEngine>, mut since: u64) {
        let book_id = engine.book_id().clone();
        info!(book = %book_id, since, "Change loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = engine.await_change(since) => match next {
                    Ok(versioned) => {
                        since = versioned.version;
                        self.fan_out(&engine, &versioned);
                    }
                    Err(MatchingError::NotifierClosed) => break,
                    Err(e) => {
                        error!(book = %book_id, %e, "Change loop failed");
                        break;
                    }
                },
            }
        }

        self.loops.lock().remove(&book_id);
        info!(book = %book_id, "Change loop stopped");
    }

    /// Deliver `versioned` to every subscriber that has not seen it yet
    fn fan_out(&self, engine: &OrderBookEngine, versioned: &Versioned<BookSnapshot>) {
        let book_id = engine.book_id();
        let mut gone = Vec::new();
        {
            let mut subscribers = self.subscribers.lock();
            let Some(subs) = subscribers.get_mut(book_id) else {
                return;
            };
            if subs.values().all(|s| s.last_version >= versioned.version) {
                return;
            }
            let message = match Self::push_message(book_id, engine.project(versioned)) {
                Ok(message) => message,
                Err(e) => {
                    error!(book = %book_id, %e, "Failed to encode book push");
                    return;
                }
            };
            for (conn_id, sub) in subs.iter_mut() {
                if sub.last_version >= versioned.version {
                    continue;
                }
                if sub.outbound.send(message.clone()).is_err() {
                    warn!(book = %book_id, conn_id, "Push failed, dropping subscriber");
                    gone.push(*conn_id);
                    continue;
                }
                sub.last_version = versioned.version;
                self.pushes.increment(1);
            }
            for conn_id in &gone {
                subs.remove(conn_id);
            }
        }

        if gone.is_empty() {
            debug!(book = %book_id, version = versioned.version, "Book pushed");
            return;
        }
        self.pruned.increment(gone.len() as u64);
        for conn_id in gone {
            self.forget_book(conn_id, book_id);
        }
    }

    pub fn get_book_orders(&self, book_id: Option<&str>) -> Result<BookOrdersView> {
        Ok(self.coerce_book(book_id)?.get_book_orders())
    }

    pub fn get_order_status(&self, book_id: Option<&str>, ids: &[OrderId]) -> Result<BookOrdersView> {
        Ok(self.coerce_book(book_id)?.get_order_status(ids))
    }

    pub fn get_offer(&self, book_id: Option<&str>, id: &OrderId) -> Result<OrderView> {
        Ok(self.coerce_book(book_id)?.get_offer(id)?)
    }

    /// Submit on its own task so a dropped caller cannot abandon a settlement
    pub async fn submit_order(
        &self,
        book_id: Option<&str>,
        proposal: Proposal,
        order_id: Option<OrderId>,
    ) -> Result<SubmitOutcome> {
        let engine = self.coerce_book(book_id)?;
        let outcome = tokio::spawn(async move { engine.submit(proposal, order_id).await })
            .await
            .map_err(|e| GatewayError::Internal(format!("submission task failed: {}", e)))??;
        Ok(outcome)
    }

    /// Answer one client request from `conn_id`
    pub async fn handle_request(self: &Arc<Self>, conn_id: ConnectionId, request: ClientRequest) -> Result<ServerMessage> {
        match request {
            ClientRequest::GetBookOrders { book_id } => {
                let engine = self.coerce_book(book_id.as_deref())?;
                Ok(ServerMessage::BookOrders {
                    book_id: engine.book_id().clone(),
                    data: engine.get_book_orders(),
                })
            }
            ClientRequest::SubscribeBookOrders { book_id } => {
                let engine = self.coerce_book(book_id.as_deref())?;
                let status = self.subscribe(conn_id, &engine)?;
                Ok(ServerMessage::SubscribeBookOrdersResponse {
                    book_id: engine.book_id().clone(),
                    data: status,
                })
            }
            ClientRequest::UnsubscribeBookOrders { book_id } => {
                let engine = self.coerce_book(book_id.as_deref())?;
                let was_subscribed = self.unsubscribe(conn_id, engine.book_id())?;
                Ok(ServerMessage::UnsubscribeBookOrdersResponse {
                    book_id: engine.book_id().clone(),
                    data: was_subscribed,
                })
            }
            ClientRequest::SubmitOrder {
                book_id,
                order_id,
                give,
                want,
            } => {
                let engine = self.coerce_book(book_id.as_deref())?;
                let outcome = self
                    .submit_order(Some(engine.book_id().as_str()), protocol::proposal(give, want), order_id)
                    .await?;
                Ok(ServerMessage::SubmitOrderResponse {
                    book_id: engine.book_id().clone(),
                    data: outcome,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use common::{Brand, BrandedAmount};
    use config::{BookConfig, PairSideConfig, SimplexConfig};
    use serde_json::Value;
    use settlement::InMemoryEscrow;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const BOOK: &str = "simoleans-moola";

    fn gateway_for(config: &SimplexConfig) -> Arc<Gateway> {
        let registry = BookRegistry::from_config(config, Arc::new(InMemoryEscrow::new()));
        Gateway::new(Arc::new(registry), CancellationToken::new())
    }

    fn gateway() -> Arc<Gateway> {
        gateway_for(&config::generate_default_config())
    }

    fn connect(gateway: &Gateway, conn_id: ConnectionId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        gateway.open_session(conn_id, tx);
        rx
    }

    fn sell(asset: u64, price: u64) -> Proposal {
        Proposal::sell(
            BrandedAmount::new(Brand::new("simoleans"), asset),
            BrandedAmount::new(Brand::new("moola"), price),
        )
    }

    async fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("push not delivered")
            .expect("channel closed");
        serde_json::from_str(message.to_text().unwrap()).unwrap()
    }

    async fn drain() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_subscribe_twice_is_already() {
        let gateway = gateway();
        let engine = gateway.coerce_book(None).unwrap();
        let mut rx = connect(&gateway, 1);

        assert_eq!(gateway.subscribe(1, &engine).unwrap(), SubscribeStatus::Ok);
        assert_eq!(gateway.subscribe(1, &engine).unwrap(), SubscribeStatus::Already);
        assert_eq!(gateway.subscriber_count(BOOK), 1);

        // One initial push only
        let initial = next_json(&mut rx).await;
        assert_eq!(initial["type"], "exchange/bookOrders");
        gateway.submit_order(None, sell(9, 5), None).await.unwrap();
        let pushed = next_json(&mut rx).await;
        assert_eq!(pushed["data"]["sell"].as_array().unwrap().len(), 1);
        drain().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_two_connections_each_get_one_identical_push() {
        let gateway = gateway();
        let engine = gateway.coerce_book(Some(BOOK)).unwrap();
        let mut first = connect(&gateway, 1);
        let mut second = connect(&gateway, 2);
        gateway.subscribe(1, &engine).unwrap();
        gateway.subscribe(2, &engine).unwrap();
        next_json(&mut first).await;
        next_json(&mut second).await;

        gateway.submit_order(Some(BOOK), sell(9, 5), None).await.unwrap();

        let a = next_json(&mut first).await;
        let b = next_json(&mut second).await;
        assert_eq!(a, b);
        assert_eq!(a["bookId"], BOOK);
        drain().await;
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_pruned() {
        let gateway = gateway();
        let engine = gateway.coerce_book(None).unwrap();
        let dead = connect(&gateway, 1);
        let mut live = connect(&gateway, 2);
        gateway.subscribe(1, &engine).unwrap();
        gateway.subscribe(2, &engine).unwrap();
        next_json(&mut live).await;
        drop(dead);

        gateway.submit_order(None, sell(9, 5), None).await.unwrap();

        let pushed = next_json(&mut live).await;
        assert_eq!(pushed["data"]["sell"].as_array().unwrap().len(), 1);
        drain().await;
        assert_eq!(gateway.subscriber_count(BOOK), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_disconnect() {
        let gateway = gateway();
        let engine = gateway.coerce_book(None).unwrap();
        let _rx = connect(&gateway, 1);
        gateway.subscribe(1, &engine).unwrap();

        assert!(gateway.unsubscribe(1, engine.book_id()).unwrap());
        assert!(!gateway.unsubscribe(1, engine.book_id()).unwrap());
        assert_eq!(gateway.subscribe(1, &engine).unwrap(), SubscribeStatus::Ok);

        gateway.close_session(1);
        assert_eq!(gateway.subscriber_count(BOOK), 0);
        assert_matches!(gateway.subscribe(1, &engine), Err(GatewayError::SubscriptionState(1)));
    }

    #[tokio::test]
    async fn test_subscribe_on_closed_connection_is_not_recorded() {
        let gateway = gateway();
        let engine = gateway.coerce_book(None).unwrap();
        drop(connect(&gateway, 1));

        assert_matches!(gateway.subscribe(1, &engine), Err(GatewayError::ConnectionClosed(1)));
        assert_eq!(gateway.subscriber_count(BOOK), 0);
        // Not reported as already subscribed on retry
        assert_matches!(gateway.subscribe(1, &engine), Err(GatewayError::ConnectionClosed(1)));

        let mut rx = connect(&gateway, 1);
        assert_eq!(gateway.subscribe(1, &engine).unwrap(), SubscribeStatus::Ok);
        assert_eq!(next_json(&mut rx).await["type"], "exchange/bookOrders");
        assert_eq!(gateway.subscriber_count(BOOK), 1);
    }

    #[tokio::test]
    async fn test_pinned_book_refuses_others() {
        let gateway = gateway();
        assert_matches!(
            gateway.get_book_orders(Some("other")),
            Err(GatewayError::BookMismatch { requested, .. }) if requested == "other"
        );
        assert!(gateway.get_book_orders(None).is_ok());
    }

    #[tokio::test]
    async fn test_unpinned_requires_book_id() {
        let mut config = config::generate_default_config();
        config.default_book = None;
        config.books.push(BookConfig {
            id: "quatloos-moola".to_string(),
            asset: PairSideConfig {
                keyword: "Asset".to_string(),
                brand: "quatloos".to_string(),
                label: None,
            },
            price: PairSideConfig {
                keyword: "Price".to_string(),
                brand: "moola".to_string(),
                label: None,
            },
        });
        let gateway = gateway_for(&config);

        assert_matches!(gateway.get_book_orders(None), Err(GatewayError::MissingBook));
        assert!(gateway.get_book_orders(Some("quatloos-moola")).is_ok());
        assert_matches!(
            gateway.get_book_orders(Some("nope")),
            Err(GatewayError::Matching(MatchingError::BookNotFound(_)))
        );
    }

    #[tokio::test]
    async fn test_submit_without_keys_changes_nothing() {
        let gateway = gateway();
        let before = gateway.get_book_orders(None).unwrap();

        let request = ClientRequest::parse(r#"{"type":"exchange/submitOrder"}"#).unwrap();
        let result = gateway.handle_request(1, request).await;

        assert_matches!(result, Err(GatewayError::Matching(MatchingError::InvalidProposal(_))));
        assert_eq!(gateway.get_book_orders(None).unwrap(), before);
    }

    #[tokio::test]
    async fn test_closed_book_stops_loop() {
        let gateway = gateway();
        let engine = gateway.coerce_book(None).unwrap();
        let _rx = connect(&gateway, 1);
        gateway.subscribe(1, &engine).unwrap();
        assert!(gateway.loops.lock().contains(BOOK));

        gateway.registry().shutdown();
        drain().await;
        assert!(!gateway.loops.lock().contains(BOOK));
    }
}
