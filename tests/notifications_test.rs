//! Direct delivery: per-channel flags, reminder sweeps and the queue fallback.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Utc};
use common::{RecordingSender, TestApp};
use rental_booking_api::{
    circuit_breaker::CircuitBreakerConfig,
    entities::{booking::BookingStatus, product::ProductCategory},
    notifications::{
        channels::{DisabledChannel, EmailChannel, EmailMessage, SmsChannel},
        delivery::DeliverySettings,
        scheduler::ReminderScheduler,
        DirectSender, NotificationDispatcher, NotificationError, NotificationJob, NotificationKind,
        NotificationSender,
    },
};
use rust_decimal_macros::dec;

#[derive(Default)]
struct Outbox {
    emails: Mutex<Vec<EmailMessage>>,
    texts: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailChannel for Outbox {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        self.emails.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl SmsChannel for Outbox {
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, NotificationError> {
        let mut texts = self.texts.lock().unwrap();
        texts.push((to.to_string(), body.to_string()));
        Ok(format!("SM{}", texts.len()))
    }
}

struct Unreachable;

#[async_trait]
impl NotificationSender for Unreachable {
    async fn send(&self, _job: &NotificationJob) -> Result<(), NotificationError> {
        Err(NotificationError::Delivery("queue down".into()))
    }
}

fn settings() -> DeliverySettings {
    DeliverySettings {
        site_name: "Harbor Rentals".to_string(),
        public_base_url: "https://rentals.test".to_string(),
        default_country_code: "+1".to_string(),
    }
}

fn breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        timeout: Duration::from_secs(30),
        success_threshold: 1,
    }
}

#[tokio::test]
async fn confirmation_flags_track_each_channel() {
    let app = TestApp::new().await;
    let pod = app
        .seed_product("8ft Pod", ProductCategory::StoragePod, dec!(75.00), 2)
        .await;
    let booking = app
        .insert_booking(&pod, Utc::now().date_naive(), None, BookingStatus::Confirmed)
        .await;
    let job = NotificationJob {
        kind: NotificationKind::BookingConfirmation,
        entity_id: booking.id,
    };

    let outbox = Arc::new(Outbox::default());
    let email_only = DirectSender::new(
        app.state.db.clone(),
        outbox.clone(),
        Arc::new(DisabledChannel::new("sms")),
        settings(),
    );
    email_only.send(&job).await.unwrap();

    let stored = app.find_booking(booking.booking_id).await;
    assert!(stored.confirmation_email_sent);
    assert!(!stored.confirmation_sms_sent);
    let emails = outbox.emails.lock().unwrap().clone();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "sam@example.com");
    assert!(emails[0].subject.starts_with("Booking Confirmed"));

    // A later run only retries the channel that failed
    let both = DirectSender::new(app.state.db.clone(), outbox.clone(), outbox.clone(), settings());
    both.send(&job).await.unwrap();
    both.send(&job).await.unwrap();

    let stored = app.find_booking(booking.booking_id).await;
    assert!(stored.confirmation_email_sent);
    assert!(stored.confirmation_sms_sent);
    assert_eq!(outbox.emails.lock().unwrap().len(), 1);
    let texts = outbox.texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "+15550001111");
}

#[tokio::test]
async fn missing_booking_is_reported() {
    let app = TestApp::new().await;
    let outbox = Arc::new(Outbox::default());
    let sender = DirectSender::new(app.state.db.clone(), outbox.clone(), outbox.clone(), settings());

    let result = sender
        .send(&NotificationJob {
            kind: NotificationKind::DropOffReminder,
            entity_id: 4_040,
        })
        .await;
    assert!(matches!(result, Err(NotificationError::NotFound(_))));
    assert!(outbox.emails.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reminder_sweep_targets_tomorrow_once() {
    let app = TestApp::new().await;
    let bin = app
        .seed_product("Yard Bin", ProductCategory::GarbageBin, dec!(45.00), 5)
        .await;
    let today = Utc::now().date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap();

    let due = app
        .insert_booking(&bin, tomorrow, None, BookingStatus::Confirmed)
        .await;
    app.insert_booking(&bin, tomorrow, None, BookingStatus::Cancelled)
        .await;
    app.insert_booking(&bin, today, None, BookingStatus::Confirmed)
        .await;

    let outbox = Arc::new(Outbox::default());
    let direct = Arc::new(DirectSender::new(
        app.state.db.clone(),
        outbox.clone(),
        outbox.clone(),
        settings(),
    ));
    let scheduler = ReminderScheduler::new(
        app.state.services.bookings.clone(),
        app.state.services.checkout.clone(),
        NotificationDispatcher::new(direct.clone(), direct, breaker()),
        9,
    );

    let report = scheduler.sweep(today).await.unwrap();
    assert_eq!(report.drop_off_reminders, 1);
    assert_eq!(report.pickup_reminders, 0);
    assert!(app.find_booking(due.booking_id).await.drop_off_reminder_sent);
    assert!(outbox.emails.lock().unwrap()[0]
        .subject
        .starts_with("Delivery Tomorrow"));

    let report = scheduler.sweep(today).await.unwrap();
    assert_eq!(report.drop_off_reminders, 0);
    assert_eq!(outbox.emails.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unavailable_queue_falls_back_to_direct_delivery() {
    let fallback = Arc::new(RecordingSender::default());
    let dispatcher = NotificationDispatcher::new(Arc::new(Unreachable), fallback.clone(), breaker());

    dispatcher.notify(NotificationKind::PickupReminder, 7).await;

    // Fallback delivery runs on a spawned task
    for _ in 0..50 {
        if !fallback.jobs().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        fallback.jobs(),
        vec![NotificationJob {
            kind: NotificationKind::PickupReminder,
            entity_id: 7
        }]
    );
}
