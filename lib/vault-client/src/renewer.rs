//! Background renewal of a token or a lease.
//!
//! A renewer renews immediately, then again shortly before each granted lease
//! runs out, until Vault stops extending it. Progress is reported on a single
//! ordered stream: any number of [`RenewalEvent::Renewed`] followed by at most
//! one [`RenewalEvent::Expired`].

use crate::error::{ExpiryCause, VaultError};
use crate::models::{Lease, RenewalEvent, Renewable};
use crate::store::SecretStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewerState {
    Idle,
    /// Renewal request in flight
    Renewing,
    /// Last attempt succeeded, waiting for the next one
    Renewed,
    Expired,
    Stopped,
}

/// Cloneable, idempotent stop switch for a running renewer
#[derive(Clone)]
pub struct RenewalStopper {
    stop: Arc<watch::Sender<bool>>,
}

impl RenewalStopper {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Both stoppers control the same renewer
    pub fn same_renewer(&self, other: &RenewalStopper) -> bool {
        Arc::ptr_eq(&self.stop, &other.stop)
    }
}

/// Owner side of a renewer. Dropping it stops the renewer.
pub struct RenewalHandle {
    events: mpsc::UnboundedReceiver<RenewalEvent>,
    stopper: RenewalStopper,
    state: watch::Receiver<RenewerState>,
}

impl RenewalHandle {
    /// Next event, `None` once the renewer has terminated
    pub async fn next_event(&mut self) -> Option<RenewalEvent> {
        self.events.recv().await
    }

    pub fn stop(&self) {
        self.stopper.stop();
    }

    pub fn stopper(&self) -> RenewalStopper {
        self.stopper.clone()
    }

    pub fn state(&self) -> RenewerState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<RenewerState> {
        self.state.clone()
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.stopper.stop();
    }
}

pub struct Renewer;

impl Renewer {
    /// Spawns the renewal task for `target`. `grace` is how long before the lease
    /// runs out the next attempt is made. Must be called inside a tokio runtime.
    pub fn start(store: Arc<dyn SecretStore>, target: Renewable, grace: Duration) -> RenewalHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RenewerState::Idle);
        let (stop_tx, stop_rx) = watch::channel(false);

        state_tx.send_replace(RenewerState::Renewing);

        let span = match &target {
            Renewable::Token(credential) => {
                tracing::info_span!("renewer", accessor = %credential.accessor)
            }
            Renewable::Lease(lease) => tracing::info_span!("renewer", lease_id = %lease.lease_id),
        };

        let task = RenewalTask {
            store,
            current: target,
            grace,
            events: events_tx,
            state: state_tx,
            stop: stop_rx,
        };
        tokio::spawn(task.run().instrument(span));

        RenewalHandle {
            events: events_rx,
            stopper: RenewalStopper {
                stop: Arc::new(stop_tx),
            },
            state: state_rx,
        }
    }
}

struct RenewalTask {
    store: Arc<dyn SecretStore>,
    current: Renewable,
    grace: Duration,
    events: mpsc::UnboundedSender<RenewalEvent>,
    state: watch::Sender<RenewerState>,
    stop: watch::Receiver<bool>,
}

impl RenewalTask {
    async fn run(mut self) {
        let outcome = self.renew_until_terminal().await;

        match outcome {
            Some(cause) => {
                let state = if cause.is_fatal() {
                    RenewerState::Expired
                } else {
                    RenewerState::Stopped
                };
                self.state.send_replace(state);
                tracing::debug!(cause = %cause, "Renewer finished");
                let _ = self.events.send(RenewalEvent::Expired { cause });
            }
            None => {
                self.state.send_replace(RenewerState::Stopped);
                tracing::debug!("Renewer stopped before the first renewal");
            }
        }
    }

    /// `None` when stopped before anything was reported
    async fn renew_until_terminal(&mut self) -> Option<ExpiryCause> {
        let mut renewals = 0u64;
        let stop_outcome = |renewals: u64| (renewals > 0).then_some(ExpiryCause::ExplicitStop);

        loop {
            self.state.send_replace(RenewerState::Renewing);

            let attempt = tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => return stop_outcome(renewals),
                result = renew_once(self.store.as_ref(), &self.current) => result,
            };

            let renewal = match attempt {
                Ok(renewal) => renewal,
                Err(e) => return Some(ExpiryCause::RenewRpcFailed(e)),
            };

            let prior = self.current.lease_duration();
            self.current = renewal;
            renewals += 1;
            self.state.send_replace(RenewerState::Renewed);
            let _ = self.events.send(RenewalEvent::Renewed {
                renewal: self.current.clone(),
                renewed_at: Utc::now(),
            });

            let lease = self.current.lease_duration();
            if !self.current.is_renewable() || lease.is_zero() {
                return Some(ExpiryCause::NotRenewable);
            }

            // A lease that shrinks into the grace window is capped by its max TTL:
            // let it run out instead of renewing into nothing.
            if lease < prior && lease <= self.grace {
                tracing::debug!(remaining = ?lease, "Max TTL reached, waiting for expiry");
                tokio::select! {
                    biased;
                    _ = stopped(&mut self.stop) => return stop_outcome(renewals),
                    _ = tokio::time::sleep(lease) => return Some(ExpiryCause::MaxTtlExceeded),
                }
            }

            let wait = next_attempt_in(lease, self.grace);
            tracing::debug!(lease = ?lease, wait = ?wait, "Next renewal scheduled");
            tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => return stop_outcome(renewals),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

async fn renew_once(store: &dyn SecretStore, current: &Renewable) -> Result<Renewable, VaultError> {
    match current {
        Renewable::Token(credential) => {
            let secret = store.renew_self(&credential.token, Duration::ZERO).await?;
            let auth = secret.auth.ok_or_else(|| {
                VaultError::InvalidResponse("renew-self returned no auth data".to_string())
            })?;
            Ok(Renewable::Token(credential.renewed(&auth)))
        }
        Renewable::Lease(lease) => {
            let secret = store.renew_lease(&lease.lease_id, Duration::ZERO).await?;
            Ok(Renewable::Lease(Lease {
                lease_id: secret.lease_id.unwrap_or_else(|| lease.lease_id.clone()),
                lease_duration: secret.lease_duration,
                renewable: secret.renewable,
            }))
        }
    }
}

/// Resolves once a stop was requested or every stopper is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

fn next_attempt_in(lease: Duration, grace: Duration) -> Duration {
    if lease > grace {
        lease - grace
    } else {
        lease * 2 / 3
    }
}
