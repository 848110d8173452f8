//! Interactive entry/exit loop.

use crate::gate::PresenceCheck;
use crate::input::LineSource;
use parking_core::{Clock, CustomerInfo, ExitOutcome, Lot, LotError, PaymentOutcome, Plate};
use std::io::{self, Write};
use std::ops::ControlFlow;

const ACTION_PROMPT: &str =
    "Type 'entrar' for an arriving vehicle or 'sair' for a departing one ('q' quits): ";

/// One operator session over a lot.
pub struct Console<C: Clock, P, L, W> {
    lot: Lot<C>,
    presence: P,
    input: L,
    out: W,
}

impl<C, P, L, W> Console<C, P, L, W>
where
    C: Clock,
    P: PresenceCheck,
    L: LineSource,
    W: Write,
{
    pub fn new(lot: Lot<C>, presence: P, input: L, out: W) -> Self {
        Self {
            lot,
            presence,
            input,
            out,
        }
    }

    pub fn lot(&self) -> &Lot<C> {
        &self.lot
    }

    /// Run until `q` or end of input. Only output failures are fatal.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            let Some(action) = self.prompt(ACTION_PROMPT)? else {
                tracing::info!("input closed, ending session");
                return Ok(());
            };

            let flow = match action.trim().to_lowercase().as_str() {
                "entrar" => self.handle_entry()?,
                "sair" => self.handle_exit()?,
                "q" => {
                    writeln!(self.out, "Exiting...")?;
                    return Ok(());
                }
                other => {
                    tracing::debug!(action = other, "unrecognised action");
                    writeln!(self.out, "Invalid action. Try again.")?;
                    ControlFlow::Continue(())
                }
            };

            if flow.is_break() {
                return Ok(());
            }
        }
    }

    fn prompt(&mut self, message: &str) -> io::Result<Option<String>> {
        write!(self.out, "{message}")?;
        self.out.flush()?;
        Ok(self.input.next_line())
    }

    fn report_storage_error(&mut self, err: LotError) -> io::Result<ControlFlow<()>> {
        tracing::error!(error = %err, "storage operation failed");
        writeln!(self.out, "Storage error: {err}")?;
        Ok(ControlFlow::Continue(()))
    }

    fn handle_entry(&mut self) -> io::Result<ControlFlow<()>> {
        match self.presence.time_limit() {
            Some(limit) => writeln!(
                self.out,
                "Checking for a face for up to {} s... type 'q' and press Enter to finish sooner.",
                limit.as_secs()
            )?,
            None => writeln!(
                self.out,
                "Checking for a face... type 'q' and press Enter to finish the check."
            )?,
        }
        self.out.flush()?;

        let face_seen = match self.presence.check(&mut self.input) {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!(error = %e, "presence check failed");
                writeln!(self.out, "Presence check failed: {e}")?;
                false
            }
        };
        if !face_seen {
            writeln!(self.out, "No face detected. Try again.")?;
            return Ok(ControlFlow::Continue(()));
        }
        writeln!(self.out, "Customer recognized.")?;

        let Some(raw) = self.prompt("Car plate (format AAA1A11): ")? else {
            return Ok(ControlFlow::Break(()));
        };
        let plate = match Plate::parse(&raw) {
            Ok(plate) => plate,
            Err(_) => {
                writeln!(self.out, "Invalid plate. Plates must follow the format AAA1A11.")?;
                return Ok(ControlFlow::Continue(()));
            }
        };

        let outcome = match self.lot.register_entry(&plate, None) {
            Ok(outcome) => outcome,
            Err(e) => return self.report_storage_error(e),
        };

        if outcome.is_first_visit() {
            let Some(name) = self.prompt("Customer name: ")? else {
                return Ok(ControlFlow::Break(()));
            };
            let Some(model) = self.prompt("Car model: ")? else {
                return Ok(ControlFlow::Break(()));
            };
            if let Err(e) = self
                .lot
                .complete_registration(&plate, CustomerInfo::new(name, model))
            {
                return self.report_storage_error(e);
            }
        }

        writeln!(
            self.out,
            "Vehicle registered (visit #{}).",
            outcome.visit_count()
        )?;
        Ok(ControlFlow::Continue(()))
    }

    fn handle_exit(&mut self) -> io::Result<ControlFlow<()>> {
        let Some(raw_plate) = self.prompt("Car plate: ")? else {
            return Ok(ControlFlow::Break(()));
        };
        let Some(raw_rate) = self.prompt("Hourly rate: ")? else {
            return Ok(ControlFlow::Break(()));
        };
        let Some(rate) = parse_rate(&raw_rate) else {
            writeln!(self.out, "Invalid hourly rate: {raw_rate:?}.")?;
            return Ok(ControlFlow::Continue(()));
        };

        // A malformed plate can never have been stored.
        let Ok(plate) = Plate::parse(&raw_plate) else {
            writeln!(self.out, "Vehicle not found.")?;
            return Ok(ControlFlow::Continue(()));
        };

        let outcome = match self.lot.register_exit(&plate, rate) {
            Ok(outcome) => outcome,
            Err(e) => return self.report_storage_error(e),
        };

        match outcome {
            ExitOutcome::NotFound => {
                writeln!(self.out, "Vehicle not found.")?;
                Ok(ControlFlow::Continue(()))
            }
            ExitOutcome::LoyaltyFree => {
                writeln!(self.out, "Free exit for loyalty!")?;
                Ok(ControlFlow::Continue(()))
            }
            ExitOutcome::Charged { amount } if amount == 0.0 => {
                // Stored as settled; there is nothing to confirm.
                writeln!(self.out, "Amount due: R$ 0.00")?;
                writeln!(self.out, "Nothing to pay.")?;
                Ok(ControlFlow::Continue(()))
            }
            ExitOutcome::Charged { amount } => {
                writeln!(self.out, "Amount due: R$ {amount:.2}")?;
                self.settle(&plate)
            }
        }
    }

    fn settle(&mut self, plate: &Plate) -> io::Result<ControlFlow<()>> {
        let mut io_error = None;
        let mut input_closed = false;

        let settled = self.lot.settle_payment(plate, |_amount| {
            let prompted = write!(self.out, "Type 1 if paid or 2 if not: ")
                .and_then(|()| self.out.flush());
            if let Err(e) = prompted {
                io_error = Some(e);
                return None;
            }
            let answer = self.input.next_line();
            input_closed = answer.is_none();
            answer.as_deref().and_then(parse_payment_answer)
        });

        if let Some(e) = io_error {
            return Err(e);
        }

        let outcome = match settled {
            Ok(outcome) => outcome,
            Err(e) => return self.report_storage_error(e),
        };

        match outcome {
            PaymentOutcome::NothingPending => {
                writeln!(self.out, "No pending payment or free loyalty exit.")?
            }
            PaymentOutcome::Recorded { paid: true } => writeln!(self.out, "Payment recorded.")?,
            PaymentOutcome::Recorded { paid: false } => {
                writeln!(self.out, "Payment left pending.")?
            }
            PaymentOutcome::Unconfirmed if input_closed => return Ok(ControlFlow::Break(())),
            PaymentOutcome::Unconfirmed => {
                writeln!(self.out, "Invalid answer; payment left pending.")?
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// Hourly rate as typed by the operator. Non-finite values are rejected.
fn parse_rate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|r| r.is_finite())
}

fn parse_payment_answer(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" => Some(true),
        "2" => Some(false),
        _ => None,
    }
}
