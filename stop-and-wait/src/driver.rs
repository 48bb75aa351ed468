//! Loops that drive endpoints.
//!
//! An endpoint does nothing on its own; something has to call
//! [`Endpoint::on_packet_available`] and [`Endpoint::on_tick`] over and over.
//! Two drivers are provided:
//! - [`run_lockstep`] steps both endpoints of an in-process pair from one
//!   thread, calling a caller-supplied `advance` between rounds (sleep, or
//!   move a [`crate::timer::MockClock`] forward).
//! - [`drive`] polls a single endpoint on a tokio interval, for endpoints
//!   that talk over a real socket and run as their own task.
//!
//! Either way each endpoint is owned by exactly one loop, so no locking is
//! needed around its state; the link is the only shared piece.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::DriverConfig;
use crate::endpoint::{Endpoint, EndpointError};

#[derive(Error, Debug)]
pub enum DriveError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("sender did not terminate within {0} rounds")]
    RoundLimit(usize),
    #[error("endpoint did not terminate within {0:?}")]
    Deadline(Duration),
}

/// One logical tick: consume at most one packet, then maybe send.
pub fn step<E: Endpoint + ?Sized>(endpoint: &mut E) -> Result<(), EndpointError> {
    endpoint.on_packet_available()?;
    endpoint.on_tick()
}

/// Step `receiver` then `sender` once per round until `sender` terminates.
///
/// Once it has, whatever is still queued for `receiver` (the final ACK) is
/// drained.  Returns the number of rounds used.
pub fn run_lockstep<A, B>(
    sender: &mut A,
    receiver: &mut B,
    mut advance: impl FnMut(),
    max_rounds: usize,
) -> Result<usize, DriveError>
where
    A: Endpoint + ?Sized,
    B: Endpoint + ?Sized,
{
    let mut rounds = 0;
    while !sender.is_terminated() {
        if rounds == max_rounds {
            return Err(DriveError::RoundLimit(max_rounds));
        }
        step(receiver)?;
        step(sender)?;
        advance();
        rounds += 1;
    }
    while receiver.on_packet_available()? {}
    Ok(rounds)
}

/// Poll `endpoint` every `poll_interval` until it terminates, then keep
/// servicing it for `linger`.
///
/// Lingering lets B answer FINs that A retransmits because a FIN-ACK was
/// lost.
pub async fn drive<E: Endpoint + ?Sized>(
    endpoint: &mut E,
    config: &DriverConfig,
) -> Result<(), DriveError> {
    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let run = async {
        while !endpoint.is_terminated() {
            ticker.tick().await;
            step(endpoint)?;
        }
        Ok::<_, DriveError>(())
    };
    match config.deadline {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| DriveError::Deadline(limit))??,
        None => run.await?,
    }

    if !config.linger.is_zero() {
        log::debug!("[{}] terminated, lingering for {:?}", endpoint.address(), config.linger);
        let until = Instant::now() + config.linger;
        while Instant::now() < until {
            ticker.tick().await;
            while endpoint.on_packet_available()? {}
            endpoint.on_tick()?;
        }
    }
    Ok(())
}
