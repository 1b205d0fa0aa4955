use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, Set};
use tracing::{info, instrument, warn};

use super::{
    channels::{normalize_phone, EmailChannel, EmailMessage, SmsChannel},
    templates::{render, Rendered, TemplateContext},
    NotificationError, NotificationJob, NotificationKind, NotificationSender,
};
use crate::entities::{
    booking::{self, Entity as Booking},
    pickup_request::{self, Entity as PickupRequest},
    product::{self, Entity as Product},
};

/// Branding and phone formatting applied to every message.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub site_name: String,
    pub public_base_url: String,
    pub default_country_code: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Sent {
    email: bool,
    sms: bool,
}

impl Sent {
    fn any(self) -> bool {
        self.email || self.sms
    }
}

/// Loads the booking, renders the message and sends it over both channels.
pub struct DirectSender {
    db: Arc<DatabaseConnection>,
    email: Arc<dyn EmailChannel>,
    sms: Arc<dyn SmsChannel>,
    settings: DeliverySettings,
}

impl DirectSender {
    pub fn new(
        db: Arc<DatabaseConnection>,
        email: Arc<dyn EmailChannel>,
        sms: Arc<dyn SmsChannel>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            db,
            email,
            sms,
            settings,
        }
    }

    async fn load_booking(&self, id: i32) -> Result<(booking::Model, product::Model), NotificationError> {
        let (booking, product) = Booking::find_by_id(id)
            .find_also_related(Product)
            .one(&*self.db)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("booking {id}")))?;
        let product =
            product.ok_or_else(|| NotificationError::NotFound(format!("product for booking {id}")))?;
        Ok((booking, product))
    }

    fn render(
        &self,
        kind: NotificationKind,
        booking: &booking::Model,
        product: &product::Model,
        pickup: Option<&pickup_request::Model>,
    ) -> Rendered {
        render(
            kind,
            &TemplateContext {
                booking,
                product,
                pickup,
                site_name: &self.settings.site_name,
                public_base_url: &self.settings.public_base_url,
            },
        )
    }

    /// Sends whichever channels are still outstanding. Channel failures are logged, not returned.
    async fn dispatch(
        &self,
        kind: NotificationKind,
        booking: &booking::Model,
        rendered: &Rendered,
        skip: Sent,
    ) -> Sent {
        let mut sent = skip;

        if !skip.email {
            let message = EmailMessage {
                to: booking.customer_email.clone(),
                subject: rendered.subject.clone(),
                text: rendered.text.clone(),
                html: rendered.html.clone(),
            };
            match self.email.send_email(&message).await {
                Ok(()) => {
                    sent.email = true;
                    counter!("rentals.notifications.sent", 1, "kind" => kind.as_str(), "channel" => "email");
                }
                Err(e) => {
                    warn!(error = %e, kind = %kind, booking_id = %booking.booking_id, "email not sent");
                    counter!("rentals.notifications.failed", 1, "kind" => kind.as_str(), "channel" => "email");
                }
            }
        }

        if !skip.sms {
            let to = normalize_phone(&booking.customer_phone, &self.settings.default_country_code);
            match self.sms.send_sms(&to, &rendered.sms).await {
                Ok(sid) => {
                    sent.sms = true;
                    info!(%sid, kind = %kind, booking_id = %booking.booking_id, "sms delivered");
                    counter!("rentals.notifications.sent", 1, "kind" => kind.as_str(), "channel" => "sms");
                }
                Err(e) => {
                    warn!(error = %e, kind = %kind, booking_id = %booking.booking_id, "sms not sent");
                    counter!("rentals.notifications.failed", 1, "kind" => kind.as_str(), "channel" => "sms");
                }
            }
        }

        sent
    }

    async fn booking_confirmation(&self, booking_id: i32) -> Result<(), NotificationError> {
        let (booking, product) = self.load_booking(booking_id).await?;
        let already = Sent {
            email: booking.confirmation_email_sent,
            sms: booking.confirmation_sms_sent,
        };
        if already.email && already.sms {
            return Ok(());
        }

        let rendered = self.render(NotificationKind::BookingConfirmation, &booking, &product, None);
        let sent = self
            .dispatch(NotificationKind::BookingConfirmation, &booking, &rendered, already)
            .await;
        if sent == already {
            return Ok(());
        }

        let mut active: booking::ActiveModel = booking.into();
        active.confirmation_email_sent = Set(sent.email);
        active.confirmation_sms_sent = Set(sent.sms);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    async fn drop_off_reminder(&self, booking_id: i32) -> Result<(), NotificationError> {
        let (booking, product) = self.load_booking(booking_id).await?;
        if booking.drop_off_reminder_sent {
            return Ok(());
        }

        let rendered = self.render(NotificationKind::DropOffReminder, &booking, &product, None);
        let sent = self
            .dispatch(NotificationKind::DropOffReminder, &booking, &rendered, Sent::default())
            .await;
        if sent.any() {
            let mut active: booking::ActiveModel = booking.into();
            active.drop_off_reminder_sent = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }
        Ok(())
    }

    async fn pickup_confirmation(&self, pickup_id: i32) -> Result<(), NotificationError> {
        let pickup = PickupRequest::find_by_id(pickup_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("pickup request {pickup_id}")))?;
        let already = Sent {
            email: pickup.pickup_email_sent,
            sms: pickup.pickup_sms_sent,
        };
        if already.email && already.sms {
            return Ok(());
        }

        let (booking, product) = self.load_booking(pickup.booking_id).await?;
        let rendered =
            self.render(NotificationKind::PickupConfirmation, &booking, &product, Some(&pickup));
        let sent = self
            .dispatch(NotificationKind::PickupConfirmation, &booking, &rendered, already)
            .await;
        if sent == already {
            return Ok(());
        }

        let mut active: pickup_request::ActiveModel = pickup.into();
        active.pickup_email_sent = Set(sent.email);
        active.pickup_sms_sent = Set(sent.sms);
        active.update(&*self.db).await?;
        Ok(())
    }

    async fn pickup_reminder(&self, booking_id: i32) -> Result<(), NotificationError> {
        let (booking, product) = self.load_booking(booking_id).await?;
        if booking.pickup_reminder_sent {
            return Ok(());
        }
        let pickup = booking.find_related(PickupRequest).one(&*self.db).await?;

        let rendered =
            self.render(NotificationKind::PickupReminder, &booking, &product, pickup.as_ref());
        let sent = self
            .dispatch(NotificationKind::PickupReminder, &booking, &rendered, Sent::default())
            .await;
        if sent.any() {
            let mut active: booking::ActiveModel = booking.into();
            active.pickup_reminder_sent = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for DirectSender {
    #[instrument(skip(self), fields(kind = %job.kind, entity_id = job.entity_id))]
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        match job.kind {
            NotificationKind::BookingConfirmation => self.booking_confirmation(job.entity_id).await,
            NotificationKind::DropOffReminder => self.drop_off_reminder(job.entity_id).await,
            NotificationKind::PickupConfirmation => self.pickup_confirmation(job.entity_id).await,
            NotificationKind::PickupReminder => self.pickup_reminder(job.entity_id).await,
        }
    }
}
