//! Visit lifecycle: entry → exit → payment.

use crate::fee;
use crate::plate::Plate;
use crate::store::{StoreError, VehicleStore};
use crate::types::{CustomerInfo, VehicleRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LotError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Source of "now" for entry and exit timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Previously unseen plate; customer metadata may still be missing.
    FirstVisit,
    ReturningVisit { visit_count: u32 },
}

impl EntryOutcome {
    pub fn is_first_visit(&self) -> bool {
        matches!(self, EntryOutcome::FirstVisit)
    }

    pub fn visit_count(&self) -> u32 {
        match self {
            EntryOutcome::FirstVisit => 1,
            EntryOutcome::ReturningVisit { visit_count } => *visit_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitOutcome {
    NotFound,
    /// Loyalty visit; stored as amount 0, paid.
    LoyaltyFree,
    Charged { amount: f64 },
}

impl ExitOutcome {
    pub fn amount(&self) -> Option<f64> {
        match self {
            ExitOutcome::NotFound => None,
            ExitOutcome::LoyaltyFree => Some(0.0),
            ExitOutcome::Charged { amount } => Some(*amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// No positive amount on record; nothing was asked or written.
    NothingPending,
    Recorded { paid: bool },
    /// The confirmation answer was not understood; nothing was written.
    Unconfirmed,
}

/// Controller owning the store for the lifetime of a session.
pub struct Lot<C: Clock = SystemClock> {
    store: VehicleStore,
    clock: C,
}

impl Lot<SystemClock> {
    pub fn new(store: VehicleStore) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<C: Clock> Lot<C> {
    pub fn with_clock(store: VehicleStore, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn record(&self, plate: &Plate) -> Result<Option<VehicleRecord>, LotError> {
        Ok(self.store.get(plate)?)
    }

    /// Register an entry. Unknown plates get a fresh record; known plates
    /// start a new unpaid cycle with their customer metadata untouched.
    pub fn register_entry(
        &self,
        plate: &Plate,
        customer: Option<CustomerInfo>,
    ) -> Result<EntryOutcome, LotError> {
        let now = self.clock.now();

        if self.store.get(plate)?.is_some() {
            let visit_count = self.store.record_reentry(plate, now)?;
            tracing::info!(plate = %plate, visit_count, "returning vehicle entered");
            return Ok(EntryOutcome::ReturningVisit { visit_count });
        }

        self.store.insert_new(plate, customer.as_ref(), now)?;
        tracing::info!(plate = %plate, "new vehicle registered");
        Ok(EntryOutcome::FirstVisit)
    }

    /// Attach customer metadata captured after a first registration.
    pub fn complete_registration(
        &self,
        plate: &Plate,
        customer: CustomerInfo,
    ) -> Result<(), LotError> {
        self.store.set_customer(plate, &customer)?;
        tracing::debug!(plate = %plate, name = %customer.name, model = %customer.car_model, "customer details stored");
        Ok(())
    }

    /// Close the current visit and compute its fee.
    pub fn register_exit(&self, plate: &Plate, hourly_rate: f64) -> Result<ExitOutcome, LotError> {
        let Some(record) = self.store.get(plate)? else {
            tracing::info!(plate = %plate, "exit requested for unknown vehicle");
            return Ok(ExitOutcome::NotFound);
        };

        let now = self.clock.now();
        let hours = fee::elapsed_hours(record.entry_time, now);
        let decision = fee::compute_fee(record.visit_count, hours, hourly_rate);

        self.store
            .record_exit(plate, now, decision.amount(), decision.settled())?;

        tracing::info!(
            plate = %plate,
            visit_count = record.visit_count,
            hours,
            hourly_rate,
            amount = decision.amount(),
            "vehicle exited"
        );

        Ok(match decision {
            fee::FeeDecision::LoyaltyFree => ExitOutcome::LoyaltyFree,
            fee::FeeDecision::Charge(amount) => ExitOutcome::Charged { amount },
        })
    }

    /// Record settlement of the fee computed at exit.
    ///
    /// `confirm` is only asked when a positive amount is due; it returns
    /// `Some(paid)` for a recognised answer.
    pub fn settle_payment<F>(&self, plate: &Plate, confirm: F) -> Result<PaymentOutcome, LotError>
    where
        F: FnOnce(f64) -> Option<bool>,
    {
        let amount = match self.store.amount_due(plate)? {
            Some(amount) if amount > 0.0 => amount,
            _ => return Ok(PaymentOutcome::NothingPending),
        };

        let Some(paid) = confirm(amount) else {
            tracing::warn!(plate = %plate, amount, "payment confirmation not understood");
            return Ok(PaymentOutcome::Unconfirmed);
        };

        self.store.set_paid(plate, paid)?;
        tracing::info!(plate = %plate, amount, paid, "payment recorded");
        Ok(PaymentOutcome::Recorded { paid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::cell::Cell;

    /// Clock the tests move by hand.
    struct ManualClock(Cell<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Cell::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()))
        }

        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }
    }

    fn lot() -> Lot<ManualClock> {
        Lot::with_clock(VehicleStore::open_in_memory().unwrap(), ManualClock::new())
    }

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    #[test]
    fn test_first_and_second_entry() {
        let lot = lot();
        let p = plate("ABC1D23");

        let first = lot
            .register_entry(&p, Some(CustomerInfo::new("Maria", "Civic")))
            .unwrap();
        assert!(first.is_first_visit());
        let entered_at = lot.record(&p).unwrap().unwrap().entry_time;

        lot.clock().advance(Duration::hours(3));
        lot.register_exit(&p, 5.0).unwrap();
        lot.settle_payment(&p, |_| Some(true)).unwrap();
        assert!(lot.record(&p).unwrap().unwrap().paid);

        lot.clock().advance(Duration::hours(1));
        let second = lot
            .register_entry(&p, Some(CustomerInfo::new("Someone", "Else")))
            .unwrap();
        assert_eq!(second, EntryOutcome::ReturningVisit { visit_count: 2 });

        let rec = lot.record(&p).unwrap().unwrap();
        assert_eq!(rec.visit_count, 2);
        assert!(rec.entry_time > entered_at);
        assert!(!rec.paid);
        assert_eq!(rec.customer_name.as_deref(), Some("Maria"));
        assert_eq!(rec.car_model.as_deref(), Some("Civic"));
    }

    #[test]
    fn test_complete_registration_fills_customer() {
        let lot = lot();
        let p = plate("XYZ1A12");
        assert!(lot.register_entry(&p, None).unwrap().is_first_visit());
        lot.complete_registration(&p, CustomerInfo::new("Maria", "Civic"))
            .unwrap();

        let rec = lot.record(&p).unwrap().unwrap();
        assert_eq!(rec.customer_name.as_deref(), Some("Maria"));
        assert_eq!(rec.visit_count, 1);
    }

    #[test]
    fn test_exit_seventh_visit_two_hours() {
        let lot = lot();
        let p = plate("ABC1D23");
        for _ in 0..7 {
            lot.register_entry(&p, None).unwrap();
        }
        lot.clock().advance(Duration::hours(2));

        let outcome = lot.register_exit(&p, 10.0).unwrap();
        assert_eq!(outcome, ExitOutcome::Charged { amount: 20.0 });

        let rec = lot.record(&p).unwrap().unwrap();
        assert_eq!(rec.amount_due, Some(20.0));
        assert!(!rec.paid);
        assert!(rec.exit_time.is_some());
    }

    #[test]
    fn test_exit_tenth_visit_is_free_and_paid() {
        let lot = lot();
        let p = plate("ABC1D23");
        for _ in 0..10 {
            lot.register_entry(&p, None).unwrap();
        }
        lot.clock().advance(Duration::hours(30));

        let outcome = lot.register_exit(&p, 99.0).unwrap();
        assert_eq!(outcome, ExitOutcome::LoyaltyFree);
        assert_eq!(outcome.amount(), Some(0.0));

        let rec = lot.record(&p).unwrap().unwrap();
        assert_eq!(rec.amount_due, Some(0.0));
        assert!(rec.paid);
    }

    #[test]
    fn test_exit_unknown_plate_creates_nothing() {
        let lot = lot();
        let p = plate("ABC1D23");
        assert_eq!(lot.register_exit(&p, 5.0).unwrap(), ExitOutcome::NotFound);
        assert!(lot.record(&p).unwrap().is_none());
    }

    #[test]
    fn test_settle_nothing_pending_for_free_exit() {
        let lot = lot();
        let p = plate("ABC1D23");
        for _ in 0..10 {
            lot.register_entry(&p, None).unwrap();
        }
        lot.register_exit(&p, 5.0).unwrap();
        let before = lot.record(&p).unwrap();

        let outcome = lot
            .settle_payment(&p, |_| panic!("must not prompt"))
            .unwrap();
        assert_eq!(outcome, PaymentOutcome::NothingPending);
        assert_eq!(lot.record(&p).unwrap(), before);
    }

    #[test]
    fn test_settle_nothing_pending_before_exit_or_unknown() {
        let lot = lot();
        let p = plate("ABC1D23");
        assert_eq!(
            lot.settle_payment(&p, |_| Some(true)).unwrap(),
            PaymentOutcome::NothingPending
        );
        lot.register_entry(&p, None).unwrap();
        assert_eq!(
            lot.settle_payment(&p, |_| Some(true)).unwrap(),
            PaymentOutcome::NothingPending
        );
    }

    #[test]
    fn test_settle_records_answer() {
        let lot = lot();
        let p = plate("ABC1D23");
        lot.register_entry(&p, None).unwrap();
        lot.clock().advance(Duration::minutes(30));
        lot.register_exit(&p, 8.0).unwrap();

        let mut asked = None;
        let outcome = lot
            .settle_payment(&p, |amount| {
                asked = Some(amount);
                Some(false)
            })
            .unwrap();
        assert_eq!(outcome, PaymentOutcome::Recorded { paid: false });
        assert_eq!(asked, Some(4.0));
        assert!(!lot.record(&p).unwrap().unwrap().paid);

        let outcome = lot.settle_payment(&p, |_| Some(true)).unwrap();
        assert_eq!(outcome, PaymentOutcome::Recorded { paid: true });
        assert!(lot.record(&p).unwrap().unwrap().paid);
    }

    #[test]
    fn test_settle_unconfirmed_leaves_state() {
        let lot = lot();
        let p = plate("ABC1D23");
        lot.register_entry(&p, None).unwrap();
        lot.clock().advance(Duration::hours(1));
        lot.register_exit(&p, 8.0).unwrap();
        let before = lot.record(&p).unwrap();

        assert_eq!(
            lot.settle_payment(&p, |_| None).unwrap(),
            PaymentOutcome::Unconfirmed
        );
        assert_eq!(lot.record(&p).unwrap(), before);
    }
}
