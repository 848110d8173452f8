//! parking-core — Vehicle records, visit counting and fee rules.
//!
//! Holds everything the console needs that does not touch a camera:
//! plate validation, the fee/loyalty calculator, the SQLite-backed
//! vehicle store and the [`Lot`] service tying them together.

pub mod fee;
pub mod lot;
pub mod plate;
pub mod store;
pub mod types;

pub use fee::{FeeDecision, LOYALTY_INTERVAL};
pub use lot::{Clock, EntryOutcome, ExitOutcome, Lot, LotError, PaymentOutcome, SystemClock};
pub use plate::{is_valid_plate, Plate, PlateError};
pub use store::{StoreError, VehicleStore};
pub use types::{CustomerInfo, VehicleRecord};
