//! Notification Gateway collaborators.
//!
//! The escalation coordinator only knows the [`NotificationGateway`] trait.
//! Two adapters ship with the service:
//! - [`LogGateway`] logs the outgoing alert and accepts it. Used when no
//!   provider is configured (local development, demos).
//! - [`HttpGateway`] POSTs the alert as JSON to an SMS/push provider webhook.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::models::{Contact, LastKnown};

// ---

/// Hands one alert to one contact.
///
/// Implementations should return once the provider has accepted the message;
/// delivery confirmation arrives later through provider callbacks.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        contact: &Contact,
        message: &str,
        location: &LastKnown,
    ) -> Result<(), GatewayError>;
}

/// Gateway that only writes the alert to the log.
#[derive(Debug, Clone, Default)]
pub struct LogGateway {
    from: String,
}

impl LogGateway {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl NotificationGateway for LogGateway {
    async fn send(
        &self,
        contact: &Contact,
        message: &str,
        location: &LastKnown,
    ) -> Result<(), GatewayError> {
        // ---
        let to = contact.destination().ok_or(GatewayError::NoDestination)?;
        info!(
            to = %to,
            contact_id = %contact.id,
            from = %self.from,
            lat = location.lat,
            lng = location.lng,
            "NOTIFY -> {}",
            message
        );
        Ok(())
    }
}

/// JSON body posted to the provider webhook.
#[derive(Debug, Serialize)]
struct OutboundAlert<'a> {
    to: &'a str,
    contact_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    from: &'a str,
    message: &'a str,
    location: &'a LastKnown,
}

/// Gateway backed by an HTTP provider webhook.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    from: String,
}

impl HttpGateway {
    pub fn new(url: impl Into<String>, token: Option<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
            from: from.into(),
        }
    }
}

#[async_trait]
impl NotificationGateway for HttpGateway {
    async fn send(
        &self,
        contact: &Contact,
        message: &str,
        location: &LastKnown,
    ) -> Result<(), GatewayError> {
        // ---
        let to = contact.destination().ok_or(GatewayError::NoDestination)?;
        let body = OutboundAlert {
            to,
            contact_id: &contact.id,
            phone: contact.phone.as_deref(),
            email: contact.email.as_deref(),
            from: &self.from,
            message,
            location,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("Gateway answered {} for contact {}", status, contact.id);

        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(GatewayError::Rejected(format!("{}: {}", status, text)))
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Utc};

    fn contact() -> Contact {
        Contact {
            id: "c-1".to_string(),
            name: Some("Sam".to_string()),
            phone: Some("+15550100".to_string()),
            email: None,
        }
    }

    fn location() -> LastKnown {
        LastKnown {
            ts: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            lat: 46.85,
            lng: -121.76,
            battery: Some(40.0),
        }
    }

    #[tokio::test]
    async fn test_log_gateway_accepts() {
        // ---
        let gateway = LogGateway::new("+15559999");
        tokio_test::assert_ok!(gateway.send(&contact(), "hello", &location()).await);
    }

    #[test]
    fn test_outbound_alert_shape() {
        // ---
        let contact = contact();
        let location = location();
        let body = OutboundAlert {
            to: contact.destination().unwrap(),
            contact_id: &contact.id,
            phone: contact.phone.as_deref(),
            email: None,
            from: "+15559999",
            message: "hello",
            location: &location,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["to"], "+15550100");
        assert_eq!(value["contact_id"], "c-1");
        assert_eq!(value["location"]["battery"], 40.0);
        assert!(value.get("email").is_none());
    }

    #[tokio::test]
    async fn test_email_only_contact_is_addressed_by_email() {
        // ---
        let contact = Contact {
            phone: None,
            email: Some("sam@example.org".to_string()),
            ..contact()
        };
        let gateway = LogGateway::new("+15559999");
        tokio_test::assert_ok!(gateway.send(&contact, "hello", &location()).await);
    }

    #[tokio::test]
    async fn test_contact_without_destination_is_refused() {
        // ---
        let contact = Contact {
            phone: None,
            email: None,
            ..contact()
        };

        let gateway = LogGateway::new("+15559999");
        let err = gateway.send(&contact, "hello", &location()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoDestination));

        // Refused before any request is made.
        let gateway = HttpGateway::new("http://127.0.0.1:9/notify", None, "");
        let err = gateway.send(&contact, "hello", &location()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoDestination));
    }

    #[tokio::test]
    async fn test_http_gateway_unreachable_is_transport_error() {
        // ---
        // Port 9 on loopback is discard; nothing listens there in CI.
        let gateway = HttpGateway::new("http://127.0.0.1:9/notify", None, "");
        let err = gateway
            .send(&contact(), "hello", &location())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
