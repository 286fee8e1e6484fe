//! Public, JSON-safe views of a book
//!
//! Internal order ids and brands never leave the process. Each order gets
//! a small public id the first time it is observed, and each brand is shown
//! under the label configured for its side of the pair.

use std::collections::HashMap;

use common::{Amount, Brand, BrandedAmount, Direction, OrderId, OrderState};
use config::BookConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::{BookSnapshot, Order};
use crate::notifier::Versioned;

/// Maps a brand to the public keyword shown for it
pub trait BrandKeywords: Send + Sync {
    fn keyword(&self, brand: &Brand) -> Option<String>;
}

/// Brand labels taken from a book's configuration
#[derive(Debug, Clone, Default)]
pub struct ConfiguredKeywords {
    labels: HashMap<Brand, String>,
}

impl ConfiguredKeywords {
    pub fn from_book(book: &BookConfig) -> Self {
        let labels = [&book.asset, &book.price]
            .into_iter()
            .map(|side| (Brand::new(side.brand.clone()), side.display_label().to_string()))
            .collect();
        Self { labels }
    }
}

impl BrandKeywords for ConfiguredKeywords {
    fn keyword(&self, brand: &Brand) -> Option<String> {
        self.labels.get(brand).cloned()
    }
}

/// Shown for a brand with no configured label
pub const UNKNOWN_KEYWORD: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountView {
    pub amount: Amount,
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(rename = "publicId")]
    pub public_id: u64,
    pub state: OrderState,
    #[serde(rename = "Asset")]
    pub asset: AmountView,
    #[serde(rename = "Price")]
    pub price: AmountView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderChangeView {
    pub public_id: u64,
    pub direction: Direction,
    pub from: OrderState,
    pub to: OrderState,
}

/// The four lists plus the version they were taken at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookOrdersView {
    pub buy: Vec<OrderView>,
    pub sell: Vec<OrderView>,
    pub buy_history: Vec<OrderView>,
    pub sell_history: Vec<OrderView>,
    pub change_token: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<OrderChangeView>,
}

/// Per-book translator from internal snapshots to public views
pub struct PublicProjector {
    keywords: Box<dyn BrandKeywords>,
    ids: Mutex<PublicIds>,
}

#[derive(Default)]
struct PublicIds {
    next: u64,
    assigned: HashMap<OrderId, u64>,
}

impl PublicIds {
    fn get(&mut self, id: OrderId) -> u64 {
        let next = &mut self.next;
        *self.assigned.entry(id).or_insert_with(|| {
            *next += 1;
            *next
        })
    }
}

impl PublicProjector {
    pub fn new(keywords: impl BrandKeywords + 'static) -> Self {
        Self {
            keywords: Box::new(keywords),
            ids: Mutex::new(PublicIds::default()),
        }
    }

    /// Public id for `id`, assigning the next one on first sight
    pub fn public_id(&self, id: OrderId) -> u64 {
        self.ids.lock().get(id)
    }

    fn amount(&self, amount: Option<&BrandedAmount>) -> AmountView {
        match amount {
            Some(a) => AmountView {
                amount: a.value.clone(),
                keyword: self
                    .keywords
                    .keyword(&a.brand)
                    .unwrap_or_else(|| UNKNOWN_KEYWORD.to_string()),
            },
            None => AmountView {
                amount: Amount::zero(),
                keyword: UNKNOWN_KEYWORD.to_string(),
            },
        }
    }

    pub fn order(&self, order: &Order) -> OrderView {
        OrderView {
            public_id: self.public_id(order.id),
            state: order.state,
            asset: self.amount(order.asset()),
            price: self.amount(order.price()),
        }
    }

    pub fn snapshot(&self, snapshot: &Versioned<BookSnapshot>) -> BookOrdersView {
        let book = &snapshot.value;
        let orders = |list: &[Order]| list.iter().map(|o| self.order(o)).collect();
        BookOrdersView {
            buy: orders(&book.buy),
            sell: orders(&book.sell),
            buy_history: orders(&book.buy_history),
            sell_history: orders(&book.sell_history),
            change_token: snapshot.version,
            changes: book
                .changes
                .iter()
                .map(|c| OrderChangeView {
                    public_id: self.public_id(c.order_id),
                    direction: c.direction,
                    from: c.from,
                    to: c.to,
                })
                .collect(),
        }
    }
}
