use crate::listing::RawListing;
use crate::logic::engine::DetectionRequest;
use async_trait::async_trait;

/// Boundary to the external marketplace clients.
///
/// Implementations live in the host application (HTTP clients, websocket
/// feeds); the engine only ever sees the raw records they produce. Fetching
/// is the one suspension point of a detection request, so a caller timeout
/// naturally cancels before any CPU-bound work starts.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listings(&self, request: &DetectionRequest) -> eyre::Result<Vec<RawListing>>;
}

/// Deterministic in-memory source for tests and benchmarks.
pub struct StaticListingSource {
    listings: Vec<RawListing>,
}

impl StaticListingSource {
    pub fn new(listings: Vec<RawListing>) -> Self {
        Self { listings }
    }
}

#[async_trait]
impl ListingSource for StaticListingSource {
    async fn fetch_listings(&self, _request: &DetectionRequest) -> eyre::Result<Vec<RawListing>> {
        Ok(self.listings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_returns_its_batch() -> eyre::Result<()> {
        let raw = RawListing {
            item_id: "ak47".to_string(),
            title: "AK-47".to_string(),
            price_minor_units: 1000,
            currency: "USD".to_string(),
            quantity: 3,
            category: "rifle".to_string(),
            source: "dmarket".to_string(),
        };
        let source = StaticListingSource::new(vec![raw]);

        let fetched = source.fetch_listings(&DetectionRequest::default()).await?;
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].item_id, "ak47");
        Ok(())
    }
}
