use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::booking::{BookingStatus, PaymentStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "domain event dropped");
        }
    }
}

/// Domain events emitted by the booking lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    BookingConfirmed {
        booking_id: Uuid,
        product_id: i32,
        total_amount: Decimal,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        old_status: BookingStatus,
        new_status: BookingStatus,
    },
    PickupScheduled {
        booking_id: Uuid,
        requested_pickup_date: chrono::NaiveDate,
    },
    PaymentReconciled {
        booking_id: Uuid,
        payment_status: PaymentStatus,
        event_type: String,
    },
    PricingUpdated {
        updated_by: Option<String>,
    },
    InventoryAdjusted {
        product_id: i32,
        old_quantity: i32,
        new_quantity: i32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BookingConfirmed { .. } => "booking_confirmed",
            Event::BookingStatusChanged { .. } => "booking_status_changed",
            Event::PickupScheduled { .. } => "pickup_scheduled",
            Event::PaymentReconciled { .. } => "payment_reconciled",
            Event::PricingUpdated { .. } => "pricing_updated",
            Event::InventoryAdjusted { .. } => "inventory_adjusted",
        }
    }
}

/// Drains the event channel into the audit log until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("rentals.events.processed", 1, "event" => event.name());

        match &event {
            Event::BookingConfirmed {
                booking_id,
                product_id,
                total_amount,
            } => {
                info!(%booking_id, product_id, %total_amount, "booking confirmed");
            }
            Event::BookingStatusChanged {
                booking_id,
                old_status,
                new_status,
            } => {
                info!(%booking_id, %old_status, %new_status, "booking status changed");
            }
            Event::PickupScheduled {
                booking_id,
                requested_pickup_date,
            } => {
                info!(%booking_id, %requested_pickup_date, "pickup scheduled");
            }
            Event::PaymentReconciled {
                booking_id,
                payment_status,
                event_type,
            } => {
                info!(%booking_id, %payment_status, event_type = %event_type, "payment reconciled");
            }
            Event::PricingUpdated { updated_by } => {
                info!(updated_by = ?updated_by, "pricing settings updated");
            }
            Event::InventoryAdjusted {
                product_id,
                old_quantity,
                new_quantity,
            } => {
                info!(product_id, old_quantity, new_quantity, "inventory adjusted");
            }
        }
    }

    info!("Event processing loop stopped");
}
