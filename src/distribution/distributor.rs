//! Signal fan-out to active users.
//!
//! A run snapshots ACTIVE channel members once, writes a PENDING record for
//! each, then attempts them one by one. Each attempt is bounded by the
//! delivery timeout and committed on its own; neither a failed recipient nor
//! a record that cannot be saved aborts the run. Users whose state changes
//! mid-run keep their place in the snapshot.
//!
//! Every run gets its own id, so running a signal again records a second
//! set of deliveries next to the first.

use crate::error::{GatewayError, GatewayResult};
use crate::platform::retry::with_timeout;
use crate::platform::{MessagingClient, PlatformError, UserId};
use crate::store::{
    DeliveryRecord, DeliveryStatus, Issuer, RecordStore, Signal, SignalKind, UserStore,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one distribution run.
///
/// `delivered + failed + pending == total`; `pending` is non-zero only for
/// cancelled runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    pub run_id: Uuid,
    pub signal_id: Uuid,
    pub kind: SignalKind,
    /// ACTIVE users in the snapshot
    pub total: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Never attempted because the run was cancelled
    pub pending: usize,
    /// Attempted, but the outcome could not be saved (its record stays PENDING)
    pub unrecorded: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl DistributionReport {
    pub fn summary(&self) -> String {
        let mut text = format!(
            "📬 {} {}\n\nRecipients: {}\nDelivered: {}\nFailed: {}",
            self.kind.as_str(),
            self.signal_id,
            self.total,
            self.delivered,
            self.failed
        );
        if self.cancelled {
            text.push_str(&format!("\nCancelled with {} not attempted", self.pending));
        }
        if self.unrecorded > 0 {
            text.push_str(&format!("\n{} outcomes could not be saved", self.unrecorded));
        }
        text
    }
}

pub struct SignalDistributor<C: MessagingClient> {
    client: C,
    users: Arc<UserStore>,
    records: Arc<dyn RecordStore>,
    delivery_timeout: Duration,
}

impl<C: MessagingClient> SignalDistributor<C> {
    pub fn new(client: C, users: Arc<UserStore>, delivery_timeout: Duration) -> Self {
        let records = users.records();
        Self {
            client,
            users,
            records,
            delivery_timeout,
        }
    }

    /// Build a signal stamped with the current time.
    pub fn signal(&self, kind: SignalKind, payload: &str, issuer: Issuer) -> Signal {
        Signal::new(kind, payload, issuer, self.users.now())
    }

    /// Fan `signal` out to every ACTIVE user. Each call is a fresh run.
    pub async fn distribute(&self, signal: Signal) -> GatewayResult<DistributionReport> {
        self.distribute_with_cancel(signal, &CancellationToken::new())
            .await
    }

    /// Like `distribute`, stopping between attempts once `cancel` fires.
    ///
    /// Errors only when the run cannot be set up; once the first attempt is
    /// made a report is always returned.
    pub async fn distribute_with_cancel(
        &self,
        signal: Signal,
        cancel: &CancellationToken,
    ) -> GatewayResult<DistributionReport> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        self.records.insert_signal(&signal).await?;

        let recipients: Vec<UserId> = self
            .users
            .active_snapshot()
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();

        let pending: Vec<DeliveryRecord> = recipients
            .iter()
            .map(|&user_id| DeliveryRecord {
                run_id,
                signal_id: signal.id,
                user_id,
                status: DeliveryStatus::Pending,
                attempted_at: None,
            })
            .collect();
        self.records.insert_deliveries(&pending).await?;

        info!(
            %run_id,
            signal_id = %signal.id,
            kind = signal.kind.as_str(),
            issuer = %signal.issuer,
            recipients = recipients.len(),
            "Distribution started"
        );

        let text = render(&signal);
        let mut delivered = 0;
        let mut failed = 0;
        let mut unrecorded = 0;
        let mut cancelled = false;

        for &user in &recipients {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let status = match self.deliver(user, &text).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(signal_id = %signal.id, user_id = %user, "Delivered");
                    DeliveryStatus::Delivered
                }
                Err(e) => {
                    failed += 1;
                    let reason = match e {
                        GatewayError::DeliveryFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    warn!(signal_id = %signal.id, user_id = %user, %reason, "Delivery failed");
                    DeliveryStatus::Failed { reason }
                }
            };

            let record = DeliveryRecord {
                run_id,
                signal_id: signal.id,
                user_id: user,
                status,
                attempted_at: Some(self.users.now()),
            };
            if let Err(e) = self.records.put_delivery(&record).await {
                unrecorded += 1;
                warn!(
                    %run_id,
                    user_id = %user,
                    status = record.status.label(),
                    error = %e,
                    "Could not save delivery outcome"
                );
            }
        }

        let report = DistributionReport {
            run_id,
            signal_id: signal.id,
            kind: signal.kind,
            total: recipients.len(),
            delivered,
            failed,
            pending: recipients.len() - delivered - failed,
            unrecorded,
            cancelled,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            %run_id,
            signal_id = %signal.id,
            total = report.total,
            delivered = report.delivered,
            failed = report.failed,
            unrecorded = report.unrecorded,
            cancelled = report.cancelled,
            "Distribution finished"
        );
        Ok(report)
    }

    async fn deliver(&self, user: UserId, text: &str) -> GatewayResult<()> {
        with_timeout(self.delivery_timeout, self.client.send_message(user, text))
            .await
            .map_err(|e| GatewayError::DeliveryFailure {
                user,
                reason: failure_reason(&e),
            })
    }
}

fn failure_reason(error: &PlatformError) -> String {
    match error {
        PlatformError::Timeout(_) => "timeout".to_string(),
        PlatformError::RecipientUnavailable(detail) => detail.clone(),
        other => other.to_string(),
    }
}

/// Message text for each signal kind.
pub fn render(signal: &Signal) -> String {
    match signal.kind {
        SignalKind::Signal => format!("📈 New signal\n\n{}", signal.payload),
        SignalKind::Broadcast => format!("📢 Announcement\n\n{}", signal.payload),
        SignalKind::AutoForward => format!("📡 From the channel\n\n{}", signal.payload),
    }
}
