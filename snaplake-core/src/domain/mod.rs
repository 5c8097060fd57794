//! Domain types for snaplake

pub mod clock;
pub mod ids;
pub mod kind;
pub mod record;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{Fingerprint, ParseFingerprintError, FINGERPRINT_LEN};
pub use kind::{DataKind, COLLECTED_MINUTE};
pub use record::{format_timestamp, Record, Scalar};

/// Extra partition dimensions, in the order they appear in the key.
pub type Dimensions = Vec<(String, String)>;
