//! Escalation Coordinator: turns a trigger into one alert per emergency
//! contact.
//!
//! Every contact is notified concurrently and each send is bounded by its own
//! timeout. A failing or slow contact only marks its own outcome `failed`; the
//! result always has one entry per contact, in input order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::error::GatewayError;
use crate::gateway::NotificationGateway;
use crate::models::{Contact, DeliveryOutcome, DeliveryStatus, EscalationTrigger, LastKnown};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(5000);

// ---

/// Fan-out dispatcher over an injected gateway.
#[derive(Clone)]
pub struct EscalationCoordinator {
    gateway: Arc<dyn NotificationGateway>,
    send_timeout: Duration,
}

impl EscalationCoordinator {
    pub fn new(gateway: Arc<dyn NotificationGateway>, send_timeout: Duration) -> Self {
        Self {
            gateway,
            send_timeout,
        }
    }

    pub fn with_default_timeout(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self::new(gateway, DEFAULT_SEND_TIMEOUT)
    }

    /// Notify every contact and collect a per-contact outcome.
    pub async fn escalate(
        &self,
        contacts: &[Contact],
        trigger: &EscalationTrigger,
        last_known: &LastKnown,
    ) -> Vec<DeliveryOutcome> {
        // ---
        let message = build_message(trigger, last_known);
        self.dispatch(contacts, &message, last_known).await
    }

    /// Send a pre-built message to every contact.
    ///
    /// Each send runs on its own task, so a panicking gateway adapter only
    /// fails the contact it was serving.
    pub async fn dispatch(
        &self,
        contacts: &[Contact],
        message: &str,
        last_known: &LastKnown,
    ) -> Vec<DeliveryOutcome> {
        // ---
        let message: Arc<str> = Arc::from(message);

        let handles = contacts.iter().map(|contact| {
            let gateway = Arc::clone(&self.gateway);
            let message = Arc::clone(&message);
            let contact = contact.clone();
            let last_known = *last_known;
            let send_timeout = self.send_timeout;

            tokio::spawn(async move {
                send_one(gateway.as_ref(), &contact, &message, &last_known, send_timeout).await
            })
        });

        let outcomes: Vec<DeliveryOutcome> = join_all(handles)
            .await
            .into_iter()
            .zip(contacts)
            .map(|(joined, contact)| {
                joined.unwrap_or_else(|e| {
                    error!("Notification task for contact {} aborted: {}", contact.id, e);
                    DeliveryOutcome::failed(contact, "notification task aborted")
                })
            })
            .collect();

        let failed = outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Failed)
            .count();
        info!(
            "Escalation dispatched to {} contacts ({} failed)",
            outcomes.len(),
            failed
        );

        outcomes
    }
}

async fn send_one(
    gateway: &dyn NotificationGateway,
    contact: &Contact,
    message: &str,
    last_known: &LastKnown,
    send_timeout: Duration,
) -> DeliveryOutcome {
    // ---
    let result = if contact.destination().is_none() {
        Err(GatewayError::NoDestination)
    } else {
        let send = gateway.send(contact, message, last_known);
        match tokio::time::timeout(send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(send_timeout.as_millis() as u64)),
        }
    };

    match result {
        Ok(()) => DeliveryOutcome::queued(contact),
        Err(e) => {
            warn!("Failed to notify contact {}: {}", contact.id, e);
            DeliveryOutcome::failed(contact, e.to_string())
        }
    }
}

/// Render the alert text shared by every contact.
pub fn build_message(trigger: &EscalationTrigger, last_known: &LastKnown) -> String {
    // ---
    let prefix = match trigger {
        EscalationTrigger::MissedCheckin => "TrailSafe: No response from hiker.".to_string(),
        EscalationTrigger::Sos => "TrailSafe: SOS triggered by hiker.".to_string(),
        EscalationTrigger::Anomaly { kind, score } => format!(
            "TrailSafe: Possible {} detected (score {:.2}).",
            kind.label(),
            score
        ),
    };

    let battery = last_known
        .battery
        .map(|b| b.to_string())
        .unwrap_or_else(|| "?".to_string());

    format!(
        "{} Last seen {} at {},{}. Battery {}%.",
        prefix,
        last_known.ts_display(),
        last_known.lat,
        last_known.lng,
        battery
    )
}
