//! The ordered collection of cart items and the reducer that mutates it.
//!
//! Every operation here is synchronous and pure with respect to I/O; the
//! store applies them while holding the snapshot and persists the result
//! afterwards.
//!
//! Two invariants hold after every operation:
//! - at most one item per product id
//! - every item has a quantity of at least one

use marketplace_core::{Price, ProductId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::item::{CartItem, NewCartItem};

/// Cart items in insertion order.
///
/// Serialized as a plain JSON array of items. On read, entries that do not
/// decode as a [`CartItem`] (a zero quantity, a missing field, a price out of
/// range) are skipped and the rest of the cart is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartCollection {
    items: Vec<CartItem>,
}

impl CartCollection {
    /// Create an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Put one unit of `candidate` in the cart.
    ///
    /// An existing entry for the same id grows by one and keeps its own title,
    /// image and price; the candidate's fields are discarded. Otherwise the
    /// candidate is appended with a quantity of one.
    pub fn add(&mut self, candidate: NewCartItem) {
        match self.position(&candidate.id) {
            Some(index) => {
                if let Some(existing) = self.items.get_mut(index) {
                    existing.quantity = existing.quantity.incremented();
                }
            }
            None => self.items.push(candidate.into_item()),
        }
    }

    /// Add one unit to the entry for `id`. Returns `false` if there is none.
    pub fn increment(&mut self, id: &ProductId) -> bool {
        match self.items.iter_mut().find(|item| &item.id == id) {
            Some(item) => {
                item.quantity = item.quantity.incremented();
                true
            }
            None => false,
        }
    }

    /// Remove one unit from the entry for `id`, dropping the entry when it
    /// reaches zero. Returns `false` if there is no such entry.
    pub fn decrement(&mut self, id: &ProductId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };

        match self
            .items
            .get(index)
            .and_then(|item| item.quantity.decremented())
        {
            Some(quantity) => {
                if let Some(item) = self.items.get_mut(index) {
                    item.quantity = quantity;
                }
            }
            None => {
                self.items.remove(index);
            }
        }
        true
    }

    /// Look up the entry for `id`.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, CartItem> {
        self.items.iter()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all entries.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.quantity.get()))
            .sum()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    fn position(&self, id: &ProductId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}

impl From<Vec<CartItem>> for CartCollection {
    /// Build a collection, keeping only the first entry seen for each id.
    fn from(items: Vec<CartItem>) -> Self {
        let mut unique: Vec<CartItem> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.iter().any(|kept| kept.id == item.id) {
                unique.push(item);
            }
        }
        Self { items: unique }
    }
}

impl<'de> Deserialize<'de> for CartCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let items: Vec<CartItem> = entries
            .into_iter()
            .enumerate()
            .filter_map(
                |(index, entry)| match serde_json::from_value::<CartItem>(entry) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping unreadable cart item");
                        None
                    }
                },
            )
            .collect();
        Ok(Self::from(items))
    }
}

impl Serialize for CartCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'a> IntoIterator for &'a CartCollection {
    type Item = &'a CartItem;
    type IntoIter = std::slice::Iter<'a, CartItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::Quantity;

    use super::*;

    fn candidate(id: &str) -> NewCartItem {
        NewCartItem::new(id, "T", "u", Price::from_cents(1000))
    }

    fn ids(cart: &CartCollection) -> Vec<&str> {
        cart.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn test_add_new_item() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));

        assert_eq!(cart.len(), 1);
        let item = cart.get(&"a".into()).unwrap();
        assert_eq!(item.title, "T");
        assert_eq!(item.image_url, "u");
        assert_eq!(item.price, Price::from_cents(1000));
        assert_eq!(item.quantity, Quantity::ONE);
    }

    #[test]
    fn test_add_existing_keeps_existing_fields() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));
        cart.add(NewCartItem::new("a", "Other", "other.png", Price::from_cents(1)));

        assert_eq!(cart.len(), 1);
        let item = cart.get(&"a".into()).unwrap();
        assert_eq!(item.quantity.get(), 2);
        assert_eq!(item.title, "T");
        assert_eq!(item.image_url, "u");
        assert_eq!(item.price, Price::from_cents(1000));
    }

    #[test]
    fn test_add_ignores_candidate_quantity() {
        let mut cart = CartCollection::new();
        let mut first = candidate("a");
        first.quantity = Some(5);
        cart.add(first);

        assert_eq!(cart.get(&"a".into()).unwrap().quantity.get(), 1);
    }

    #[test]
    fn test_uniqueness_over_many_adds() {
        let mut cart = CartCollection::new();
        for id in ["a", "b", "a", "c", "b", "a"] {
            cart.add(candidate(id));
        }

        assert_eq!(ids(&cart), vec!["a", "b", "c"]);
        assert_eq!(cart.get(&"a".into()).unwrap().quantity.get(), 3);
        assert_eq!(cart.item_count(), 6);
    }

    #[test]
    fn test_increment() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));
        cart.add(candidate("b"));

        assert!(cart.increment(&"b".into()));
        assert_eq!(cart.get(&"a".into()).unwrap().quantity.get(), 1);
        assert_eq!(cart.get(&"b".into()).unwrap().quantity.get(), 2);
    }

    #[test]
    fn test_decrement_to_removal() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));

        assert!(cart.decrement(&"a".into()));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_decrement_keeps_positive_quantity() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));
        cart.add(candidate("a"));

        assert!(cart.decrement(&"a".into()));
        assert_eq!(cart.get(&"a".into()).unwrap().quantity, Quantity::ONE);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));
        let before = cart.clone();

        assert!(!cart.increment(&"z".into()));
        assert!(!cart.decrement(&"z".into()));
        assert_eq!(cart, before);
    }

    #[test]
    fn test_readd_appends_at_end() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));
        cart.add(candidate("b"));
        cart.decrement(&"a".into());
        cart.add(candidate("a"));

        assert_eq!(ids(&cart), vec!["b", "a"]);
    }

    #[test]
    fn test_subtotal() {
        let mut cart = CartCollection::new();
        cart.add(candidate("a"));
        cart.add(candidate("a"));
        cart.add(NewCartItem::new("b", "B", "b.png", Price::from_cents(250)));

        assert_eq!(cart.subtotal(), Price::from_cents(2250));
        assert_eq!(CartCollection::new().subtotal(), Price::ZERO);
    }

    #[test]
    fn test_json_roundtrip_preserves_order_and_fields() {
        let mut cart = CartCollection::new();
        cart.add(candidate("b"));
        cart.add(NewCartItem::new("a", "A", "a.png", Price::from_cents(250)));
        cart.increment(&"a".into());

        let json = serde_json::to_string(&cart).unwrap();
        assert!(json.starts_with('['));

        let parsed: CartCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cart);
        assert_eq!(ids(&parsed), vec!["b", "a"]);
    }

    #[test]
    fn test_deserialize_drops_duplicate_ids() {
        let json = r#"[
            {"id":"a","title":"first","image_url":"u","price":1,"quantity":1},
            {"id":"a","title":"second","image_url":"u","price":1,"quantity":4}
        ]"#;
        let cart: CartCollection = serde_json::from_str(json).unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.get(&"a".into()).unwrap().title, "first");
    }

    #[test]
    fn test_json_roundtrip_keeps_high_precision_price() {
        let mut cart = CartCollection::new();
        let price: Price = "1234567890.123456789".parse().unwrap();
        cart.add(NewCartItem::new("a", "A", "a.png", price));

        let json = serde_json::to_string(&cart).unwrap();
        assert!(json.contains(r#""price":1234567890.123456789"#));

        let parsed: CartCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cart);
        assert_eq!(parsed.get(&"a".into()).unwrap().price, price);
    }

    #[test]
    fn test_deserialize_skips_zero_quantity_entry() {
        let json = r#"[
            {"id":"a","title":"A","image_url":"u","price":1,"quantity":2},
            {"id":"b","title":"B","image_url":"u","price":1,"quantity":0},
            {"id":"c","title":"C","image_url":"u","price":1,"quantity":1}
        ]"#;
        let cart: CartCollection = serde_json::from_str(json).unwrap();

        assert_eq!(ids(&cart), vec!["a", "c"]);
        assert_eq!(cart.get(&"a".into()).unwrap().quantity.get(), 2);
    }

    #[test]
    fn test_deserialize_skips_out_of_range_price() {
        let json = r#"[
            {"id":"a","title":"A","image_url":"u","price":1e30,"quantity":1},
            {"id":"b","title":"B","imageUrl":"u","price":19.99,"quantity":1}
        ]"#;
        let cart: CartCollection = serde_json::from_str(json).unwrap();

        assert_eq!(ids(&cart), vec!["b"]);
        assert_eq!(cart.get(&"b".into()).unwrap().price, Price::from_cents(1999));
    }

    #[test]
    fn test_deserialize_rejects_non_array() {
        assert!(serde_json::from_str::<CartCollection>(r#"{"id":"a"}"#).is_err());
    }
}
