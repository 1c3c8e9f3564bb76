use crate::constants::SUPPORTED_CURRENCY;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Raw listing record as delivered by a marketplace client, before any
/// validation. Field names follow the wire shape of the market APIs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawListing {
    pub item_id: String,
    pub title: String,
    /// Price in minor units of `currency` (cents for USD).
    pub price_minor_units: i64,
    pub currency: String,
    pub quantity: i64,
    pub category: String,
    pub source: String,
}

/// Normalized listing consumed by the graph builder. Immutable once created;
/// the normalizer guarantees `price_cents > 0`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listing {
    item_id: String,
    display_name: String,
    category: String,
    price_cents: u64,
    available_quantity: u32,
    source_id: String,
    observed_at: u64,
}

impl Hash for Listing {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.item_id.hash(state);
        self.source_id.hash(state);
    }
}

impl PartialEq for Listing {
    fn eq(&self, other: &Self) -> bool {
        self.item_id == other.item_id && self.source_id == other.source_id
    }
}

impl Eq for Listing {}

impl Ord for Listing {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.item_id, &self.source_id).cmp(&(&other.item_id, &other.source_id))
    }
}

impl PartialOrd for Listing {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Listing {
    pub fn new(
        item_id: impl Into<String>,
        display_name: impl Into<String>,
        category: impl Into<String>,
        price_cents: u64,
        available_quantity: u32,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            display_name: display_name.into(),
            category: category.into(),
            price_cents,
            available_quantity,
            source_id: source_id.into(),
            observed_at: now_unix_secs(),
        }
    }

    pub fn get_item_id(&self) -> &str {
        &self.item_id
    }

    pub fn get_display_name(&self) -> &str {
        &self.display_name
    }

    pub fn get_category(&self) -> &str {
        &self.category
    }

    pub fn get_price_cents(&self) -> u64 {
        self.price_cents
    }

    /// Price in whole currency units.
    pub fn get_price(&self) -> f64 {
        self.price_cents as f64 / 100.0
    }

    pub fn get_available_quantity(&self) -> u32 {
        self.available_quantity
    }

    pub fn get_source_id(&self) -> &str {
        &self.source_id
    }

    pub fn get_observed_at(&self) -> u64 {
        self.observed_at
    }

    /// Key a node is derived from: the same item listed on two sources is
    /// two distinct tradable assets.
    pub fn get_node_key(&self) -> (String, String) {
        (self.item_id.clone(), self.source_id.clone())
    }
}

/// Convert a raw batch into normalized listings.
///
/// Individual bad records (missing id, non-positive price, unsupported
/// currency, negative quantity) are logged and dropped; the rest of the
/// batch survives. Returns listings in input order.
pub fn normalize_batch(raw: &[RawListing]) -> Vec<Listing> {
    let mut listings = Vec::with_capacity(raw.len());

    for record in raw {
        match normalize_record(record) {
            Some(listing) => listings.push(listing),
            None => {
                warn!(
                    item_id = %record.item_id,
                    source = %record.source,
                    price_minor_units = record.price_minor_units,
                    currency = %record.currency,
                    "dropping unusable listing record"
                );
            }
        }
    }

    debug!("normalized {} of {} raw listing records", listings.len(), raw.len());
    listings
}

fn normalize_record(record: &RawListing) -> Option<Listing> {
    if record.item_id.is_empty() || record.source.is_empty() {
        return None;
    }
    if record.currency != SUPPORTED_CURRENCY {
        return None;
    }
    if record.price_minor_units <= 0 || record.quantity < 0 {
        return None;
    }

    let display_name = if record.title.is_empty() { record.item_id.clone() } else { record.title.clone() };

    Some(Listing::new(
        record.item_id.clone(),
        display_name,
        record.category.to_lowercase(),
        record.price_minor_units as u64,
        u32::try_from(record.quantity).unwrap_or(u32::MAX),
        record.source.clone(),
    ))
}

pub(crate) fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
