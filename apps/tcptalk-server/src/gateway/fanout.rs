//! Broadcast hub for dispatching chat events to every other session.
//!
//! Each event is rendered once and offered to a registry snapshot with
//! `try_send`. A recipient whose outbound queue is full gets until a shared
//! deadline (the saturation grace) for a slot to open; one that is still full
//! then is treated as unresponsive, its close signal fires and its handler
//! tears the session down. A publish therefore waits at most one grace period,
//! which is what slows a bursting sender down to the pace of its readers.

use std::sync::Arc;
use std::time::Duration;

use tcptalk_common::SessionId;
use tokio::time::Instant;

use super::events::ChatEvent;
use super::registry::SessionRegistry;
use super::session::{ClientSession, Delivery, OutboundLine};

/// Per-publish delivery counts. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub saturated: usize,
    pub closed: usize,
}

impl FanoutReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.saturated + self.closed
    }

    fn record(&mut self, session: &ClientSession, outcome: Delivery) {
        match outcome {
            Delivery::Queued => self.delivered += 1,
            Delivery::Saturated => {
                self.saturated += 1;
                tracing::warn!(
                    session_id = %session.session_id,
                    name = %session.name,
                    "outbound queue stayed full, disconnecting slow client"
                );
                session.close();
            }
            Delivery::Closed => self.closed += 1,
        }
    }
}

/// The broadcast engine. Cloneable, shares the registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    saturation_grace: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>, saturation_grace: Duration) -> Self {
        Self {
            registry,
            saturation_grace,
        }
    }

    /// Deliver `event` to every live session except `sender`.
    pub async fn publish(&self, event: &ChatEvent, sender: &SessionId) -> FanoutReport {
        let line: OutboundLine = Arc::from(event.to_server_line().render());
        let recipients = self.registry.snapshot_others(sender);

        let mut report = FanoutReport::default();
        let mut backlogged = Vec::new();
        for session in recipients {
            match session.try_deliver(Arc::clone(&line)) {
                Delivery::Saturated => backlogged.push(session),
                outcome => report.record(&session, outcome),
            }
        }

        if !backlogged.is_empty() {
            let deadline = Instant::now() + self.saturation_grace;
            for session in &backlogged {
                let outcome = session.deliver_by(Arc::clone(&line), deadline).await;
                report.record(session, outcome);
            }
        }

        tracing::debug!(
            sender = %sender,
            event = event.kind(),
            delivered = report.delivered,
            saturated = report.saturated,
            closed = report.closed,
            backlogged = backlogged.len(),
            "broadcast event"
        );

        report
    }
}
