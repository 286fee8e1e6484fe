//! Common types used across Simplex
//!
//! This module provides the fundamental domain types used throughout
//! the exchange system.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Keyword naming the traded asset in a proposal
pub const ASSET: &str = "Asset";

/// Keyword naming the price asset in a proposal
pub const PRICE: &str = "Price";

/// Proposal keyword (`Asset` or `Price`)
pub type Keyword = String;

/// Identifier of an order book
pub type BookId = String;

/// Opaque order-claim identity
///
/// Unique for the lifetime of a book. Never exposed in public projections;
/// outward-facing views carry a per-book public id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    /// Create a new random OrderId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an OrderId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for settled trades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    /// Create a new random TradeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Give Price, want Asset
    Buy,
    /// Give Asset, want Price
    Sell,
}

impl Direction {
    /// Returns the opposite direction
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// Returns true if this is a buy order
    pub fn is_buy(&self) -> bool {
        matches!(self, Direction::Buy)
    }

    /// The booked state an order of this direction rests in
    pub fn booked_state(&self) -> OrderState {
        match self {
            Direction::Buy => OrderState::Buy,
            Direction::Sell => OrderState::Sell,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// Order lifecycle state
///
/// `Pending` → `Buy`/`Sell` (booked) → one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    /// Recorded but not yet booked
    Pending,
    /// Resting in the buy list
    Buy,
    /// Resting in the sell list
    Sell,
    /// Resting order that was paired against by an incoming order
    Matched,
    /// Incoming order that found a match
    Fulfilled,
    /// Left the book without trading
    Cancelled,
}

impl OrderState {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Matched | OrderState::Fulfilled | OrderState::Cancelled
        )
    }

    /// True while the order rests in a book list
    pub fn is_booked(&self) -> bool {
        matches!(self, OrderState::Buy | OrderState::Sell)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderState::Pending => "pending",
            OrderState::Buy => "buy",
            OrderState::Sell => "sell",
            OrderState::Matched => "matched",
            OrderState::Fulfilled => "fulfilled",
            OrderState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Opaque asset-brand identity
///
/// Brands are compared for identity only. Public projections translate them
/// to caller-supplied keywords and never expose the brand itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Brand(String);

impl Brand {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-negative arbitrary-precision quantity
///
/// Serialized as a decimal string so no precision is lost in JSON.
/// Deserialization also accepts plain JSON integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl From<BigUint> for Amount {
    fn from(v: BigUint) -> Self {
        Self(v)
    }
}

impl FromStr for Amount {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::from_str(s.trim())
            .map(Self)
            .map_err(|e| crate::Error::invalid_input(format!("invalid amount '{}': {}", s, e)))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Number(n) => Ok(Amount::from(n)),
        }
    }
}

/// A quantity of a specific brand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandedAmount {
    pub brand: Brand,
    pub value: Amount,
}

impl BrandedAmount {
    pub fn new(brand: Brand, value: impl Into<Amount>) -> Self {
        Self {
            brand,
            value: value.into(),
        }
    }

    /// True when `self` covers `wanted`: same brand and at least as much
    pub fn covers(&self, wanted: &BrandedAmount) -> bool {
        self.brand == wanted.brand && self.value >= wanted.value
    }
}

/// What a participant gives and wants, keyed by keyword
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(default)]
    pub give: BTreeMap<Keyword, BrandedAmount>,
    #[serde(default)]
    pub want: BTreeMap<Keyword, BrandedAmount>,
}

impl Proposal {
    /// Sell proposal: give `Asset`, want `Price`
    pub fn sell(asset: BrandedAmount, price: BrandedAmount) -> Self {
        Self {
            give: BTreeMap::from([(ASSET.to_string(), asset)]),
            want: BTreeMap::from([(PRICE.to_string(), price)]),
        }
    }

    /// Buy proposal: give `Price`, want `Asset`
    pub fn buy(asset: BrandedAmount, price: BrandedAmount) -> Self {
        Self {
            give: BTreeMap::from([(PRICE.to_string(), price)]),
            want: BTreeMap::from([(ASSET.to_string(), asset)]),
        }
    }

    /// Classify the proposal shape
    ///
    /// Exactly `{give: Asset, want: Price}` is a sell and exactly
    /// `{give: Price, want: Asset}` is a buy. Anything else is `None`.
    pub fn direction(&self) -> Option<Direction> {
        let only = |m: &BTreeMap<Keyword, BrandedAmount>, k: &str| m.len() == 1 && m.contains_key(k);
        if only(&self.give, ASSET) && only(&self.want, PRICE) {
            Some(Direction::Sell)
        } else if only(&self.give, PRICE) && only(&self.want, ASSET) {
            Some(Direction::Buy)
        } else {
            None
        }
    }

    /// The amount under `keyword`, whichever side it appears on
    pub fn amount(&self, keyword: &str) -> Option<&BrandedAmount> {
        self.give.get(keyword).or_else(|| self.want.get(keyword))
    }

    /// Each of `other`'s wants is covered by this proposal's gives
    pub fn satisfies(&self, other: &Proposal) -> bool {
        other.want.iter().all(|(keyword, wanted)| {
            self.give
                .get(keyword)
                .map(|given| given.covers(wanted))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simoleans(v: u64) -> BrandedAmount {
        BrandedAmount::new(Brand::new("simoleans"), v)
    }

    fn moola(v: u64) -> BrandedAmount {
        BrandedAmount::new(Brand::new("moola"), v)
    }

    #[test]
    fn test_direction_classification() {
        assert_eq!(Proposal::sell(simoleans(9), moola(5)).direction(), Some(Direction::Sell));
        assert_eq!(Proposal::buy(simoleans(9), moola(5)).direction(), Some(Direction::Buy));
        assert_eq!(Proposal::default().direction(), None);

        let mut both = Proposal::sell(simoleans(9), moola(5));
        both.give.insert(PRICE.to_string(), moola(1));
        assert_eq!(both.direction(), None);
    }

    #[test]
    fn test_mutual_satisfaction() {
        let sell = Proposal::sell(simoleans(9), moola(5));
        let buy = Proposal::buy(simoleans(9), moola(5));
        assert!(sell.satisfies(&buy));
        assert!(buy.satisfies(&sell));

        let cheap_buy = Proposal::buy(simoleans(9), moola(4));
        assert!(!cheap_buy.satisfies(&sell));

        let wrong_brand = Proposal::buy(simoleans(9), BrandedAmount::new(Brand::new("quatloos"), 5));
        assert!(!wrong_brand.satisfies(&sell));
    }

    #[test]
    fn test_amount_serde_is_decimal_string() {
        let big: Amount = "340282366920938463463374607431768211457".parse().unwrap();
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, "\"340282366920938463463374607431768211457\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, big);

        let from_number: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(from_number, Amount::from(42));
        assert!("-1".parse::<Amount>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderState::Matched.is_terminal());
        assert!(OrderState::Fulfilled.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(!OrderState::Pending.is_terminal());
        assert!(OrderState::Sell.is_booked());
        assert_eq!(Direction::Buy.booked_state(), OrderState::Buy);
    }
}
