//! Fee and loyalty rules applied at exit time.

use chrono::{DateTime, Utc};

/// Every visit whose count is a multiple of this exits for free.
pub const LOYALTY_INTERVAL: u32 = 10;

const SECS_PER_HOUR: f64 = 3600.0;

/// Outcome of the fee rule for one exit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeDecision {
    /// Loyalty visit: nothing to pay, settled on the spot.
    LoyaltyFree,
    /// Elapsed hours times the hourly rate.
    Charge(f64),
}

impl FeeDecision {
    /// Amount persisted as `amount_due`.
    pub fn amount(&self) -> f64 {
        match self {
            FeeDecision::LoyaltyFree => 0.0,
            FeeDecision::Charge(amount) => *amount,
        }
    }

    /// Value persisted as `paid`. A zero charge has nothing left to settle.
    pub fn settled(&self) -> bool {
        self.amount() == 0.0
    }
}

/// Fractional hours between entry and exit, not rounded.
///
/// A negative interval (clock moved backwards) counts as zero.
pub fn elapsed_hours(entry: DateTime<Utc>, exit: DateTime<Utc>) -> f64 {
    let millis = (exit - entry).num_milliseconds().max(0);
    millis as f64 / 1000.0 / SECS_PER_HOUR
}

pub fn is_loyalty_visit(visit_count: u32) -> bool {
    visit_count > 0 && visit_count % LOYALTY_INTERVAL == 0
}

/// Apply the loyalty rule, then the hourly rate. The rate is not validated.
pub fn compute_fee(visit_count: u32, elapsed_hours: f64, hourly_rate: f64) -> FeeDecision {
    if is_loyalty_visit(visit_count) {
        FeeDecision::LoyaltyFree
    } else {
        FeeDecision::Charge(elapsed_hours * hourly_rate)
    }
}
