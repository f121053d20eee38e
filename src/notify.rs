// Booking notifications
// Delivery is best-effort: the controller logs a failed notification and moves on.

use crate::model::{Booking, BookingReference, BookingStatus, RefundStatus, ResourceKind};
use crate::money::Money;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification rejected with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BookingEvent {
    #[serde(rename_all = "camelCase")]
    Created {
        reference: BookingReference,
        user_id: String,
        booking_type: ResourceKind,
        total_price: Money,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled {
        reference: BookingReference,
        user_id: String,
        refund_amount: Money,
        refund_status: RefundStatus,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        reference: BookingReference,
        from: BookingStatus,
        to: BookingStatus,
    },
}

impl BookingEvent {
    pub fn created(booking: &Booking) -> Self {
        BookingEvent::Created {
            reference: booking.reference.clone(),
            user_id: booking.user_id.clone(),
            booking_type: booking.booking_type(),
            total_price: booking.pricing.total_price,
        }
    }

    // None when the booking carries no cancellation record
    pub fn cancelled(booking: &Booking) -> Option<Self> {
        booking
            .cancellation
            .as_ref()
            .map(|cancellation| BookingEvent::Cancelled {
                reference: booking.reference.clone(),
                user_id: booking.user_id.clone(),
                refund_amount: cancellation.refund_amount,
                refund_status: cancellation.refund_status,
            })
    }

    pub fn reference(&self) -> &BookingReference {
        match self {
            BookingEvent::Created { reference, .. }
            | BookingEvent::Cancelled { reference, .. }
            | BookingEvent::StatusChanged { reference, .. } => reference,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::Created { .. } => "created",
            BookingEvent::Cancelled { .. } => "cancelled",
            BookingEvent::StatusChanged { .. } => "statusChanged",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError>;
}

// Writes events to the tracing pipeline only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError> {
        info!(event = event.name(), reference = %event.reference(), "booking event");
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(format!("POST {} failed: {}", self.url, e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::model::{BookingDetails, Cancellation};

    #[test]
    fn test_event_payload_shape() {
        let booking = fixtures::booking(BookingDetails::Vehicle(fixtures::vehicle_booking(
            fixtures::in_days(12),
            2,
        )));
        let json = serde_json::to_value(BookingEvent::created(&booking)).unwrap();

        assert_eq!(json["event"], "created");
        assert_eq!(json["bookingType"], "vehicle");
        assert_eq!(json["reference"], booking.reference.as_str());
        assert_eq!(json["totalPrice"], booking.pricing.total_price.minor());
    }

    #[test]
    fn test_cancelled_event_requires_record() {
        let mut booking = fixtures::booking(BookingDetails::Vehicle(fixtures::vehicle_booking(
            fixtures::in_days(12),
            2,
        )));
        assert!(BookingEvent::cancelled(&booking).is_none());

        booking.cancellation = Some(Cancellation {
            cancelled_at: fixtures::now(),
            reason: None,
            refund_amount: Money::from_major(10),
            refund_status: RefundStatus::Pending,
        });
        let event = BookingEvent::cancelled(&booking).unwrap();
        assert_eq!(event.name(), "cancelled");
        assert_eq!(event.reference(), &booking.reference);
    }

    #[test]
    fn test_log_notifier_never_fails() {
        let event = BookingEvent::StatusChanged {
            reference: BookingReference::from("PKG-20261018-ABCDEFGH"),
            from: BookingStatus::Pending,
            to: BookingStatus::Confirmed,
        };
        assert!(tokio_test::block_on(LogNotifier.notify(&event)).is_ok());
    }

    #[tokio::test]
    async fn test_webhook_transport_failure_is_reported() {
        // Nothing listens on the discard port
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hooks", Duration::from_millis(200)).unwrap();
        let event = BookingEvent::StatusChanged {
            reference: BookingReference::from("HTL-20261018-ABCDEFGH"),
            from: BookingStatus::Confirmed,
            to: BookingStatus::InProgress,
        };
        let err = notifier.notify(&event).await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
