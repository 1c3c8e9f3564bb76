pub mod cache;
pub mod config_loader;
pub mod fingerprint;
pub mod volatility;

pub use cache::{AdaptiveCache, CacheItem, CachePayload, CacheStats};
pub use config_loader::{LoadConfigError, load_from_file, load_from_file_sync};
pub use fingerprint::{Fingerprint, fingerprint_parts};
pub use volatility::{adaptive_ttl, price_volatility};
