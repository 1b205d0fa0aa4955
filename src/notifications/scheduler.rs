//! Daily reminder sweeps and periodic draft cleanup.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{error, info, instrument};

use super::{NotificationDispatcher, NotificationKind};
use crate::errors::ServiceError;
use crate::services::{bookings::BookingService, checkout::CheckoutService};

const DRAFT_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub drop_off_reminders: usize,
    pub pickup_reminders: usize,
}

/// First instant strictly after `now` at `hour:00` UTC.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

#[derive(Clone)]
pub struct ReminderScheduler {
    bookings: BookingService,
    checkout: CheckoutService,
    notifier: NotificationDispatcher,
    reminder_hour: u32,
}

impl ReminderScheduler {
    pub fn new(
        bookings: BookingService,
        checkout: CheckoutService,
        notifier: NotificationDispatcher,
        reminder_hour: u32,
    ) -> Self {
        Self {
            bookings,
            checkout,
            notifier,
            reminder_hour,
        }
    }

    /// Queues reminders for drop-offs and pickups happening the day after `today`.
    #[instrument(skip(self))]
    pub async fn sweep(&self, today: NaiveDate) -> Result<SweepReport, ServiceError> {
        let tomorrow = today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ServiceError::InternalError("date out of range".into()))?;
        let mut report = SweepReport::default();

        for booking in self.bookings.due_for_drop_off_reminder(tomorrow).await? {
            self.notifier
                .notify(NotificationKind::DropOffReminder, booking.id)
                .await;
            report.drop_off_reminders += 1;
        }

        for booking in self.bookings.pickups_due_for_reminder(tomorrow).await? {
            self.notifier
                .notify(NotificationKind::PickupReminder, booking.id)
                .await;
            report.pickup_reminders += 1;
        }

        info!(
            %tomorrow,
            drop_offs = report.drop_off_reminders,
            pickups = report.pickup_reminders,
            "reminder sweep finished"
        );
        Ok(report)
    }

    /// Runs the reminder sweep once a day and the draft purge every hour, forever.
    pub async fn run(self) {
        let purge = {
            let checkout = self.checkout.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(DRAFT_PURGE_INTERVAL);
                loop {
                    interval.tick().await;
                    match checkout.purge_expired(Utc::now()).await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "expired checkout drafts purged"),
                        Err(e) => error!(error = %e, "draft purge failed"),
                    }
                }
            })
        };

        info!(hour = self.reminder_hour, "reminder scheduler started");
        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.reminder_hour);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if let Err(e) = self.sweep(Utc::now().date_naive()).await {
                error!(error = %e, "reminder sweep failed");
            }
            if purge.is_finished() {
                error!("draft purge task stopped");
            }
        }
    }
}
