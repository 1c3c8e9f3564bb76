/// Node id of the base currency every detection cycle starts and ends in.
pub const BASE_CURRENCY: &str = "USD";

/// The only settlement currency accepted by the normalizer. Listings priced
/// in anything else are dropped before graph construction.
pub const SUPPORTED_CURRENCY: &str = "USD";

#[non_exhaustive]
pub struct GameId;

impl GameId {
    pub const CS2: &'static str = "a8db";
    pub const DOTA2: &'static str = "9a92";
    pub const TF2: &'static str = "tf2";
    pub const RUST: &'static str = "rust";
}

/// Relaxation deltas below this are floating-point noise, not profit. A
/// break-even cycle (profit ratio exactly 1.0) must never be reported.
pub const RELAXATION_EPSILON: f64 = 1e-9;
