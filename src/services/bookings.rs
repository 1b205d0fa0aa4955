/*!
 * # Booking lifecycle
 *
 * Persists bookings and pickup requests. Creation re-counts availability
 * inside the insert transaction; on backends with row locks the product
 * row is held exclusively for the duration.
 */

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        booking::{self, BookingStatus, Entity as Booking, PaymentStatus},
        pickup_request::{self, Entity as PickupRequest, PickupPaymentStatus},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        availability::{self, occupying_on},
        payments::{to_cents, VerifiedIntent},
    },
};

/// `monthly_rate × months + transport_fee`, fixed at booking time.
pub fn compute_total(monthly_rate: Decimal, rental_months: i32, transport_fee: Decimal) -> Decimal {
    monthly_rate * Decimal::from(rental_months) + transport_fee
}

fn email_matches(stored: &str, given: &str) -> bool {
    stored.trim().eq_ignore_ascii_case(given.trim())
}

/// Customer and delivery fields collected during checkout.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerDetails {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub customer_name: String,
    #[validate(email(message = "enter a valid email address"))]
    pub customer_email: String,
    #[validate(
        length(max = 20),
        regex(path = "crate::services::checkout::PHONE_RE", message = "enter a valid phone number")
    )]
    pub customer_phone: String,
    #[validate(length(min = 1, message = "delivery address is required"))]
    pub delivery_address: String,
    #[validate(length(min = 1, max = 100))]
    pub delivery_city: String,
    #[validate(length(min = 1, max = 50))]
    pub delivery_state: String,
    #[validate(
        length(max = 10),
        regex(path = "crate::services::checkout::ZIP_RE", message = "enter a valid ZIP code")
    )]
    pub delivery_zip: String,
    #[serde(default)]
    pub delivery_notes: String,
}

/// Prices shown to the customer when the payment intent was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub monthly_rate: Decimal,
    pub transport_fee: Decimal,
    pub total: Decimal,
}

/// Everything needed to persist a paid booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub product_id: i32,
    pub drop_off_date: NaiveDate,
    pub rental_months: i32,
    pub quote: PriceQuote,
    pub customer: CustomerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulePickup {
    pub booking_id: Uuid,
    #[validate(email)]
    pub customer_email: String,
    pub requested_pickup_date: NaiveDate,
    #[serde(default)]
    pub pickup_notes: String,
    pub pickup_address: Option<String>,
}

/// How the pickup fee was settled.
#[derive(Debug, Clone)]
pub struct PickupPayment {
    pub intent_id: Option<String>,
    pub status: PickupPaymentStatus,
}

#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub booking: booking::Model,
    pub product: product::Model,
    pub pickup: Option<pickup_request::Model>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    All,
    Today,
    Week,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub date: Option<DateFilter>,
}

#[derive(Debug, Clone)]
pub struct DashboardStats {
    pub new_orders: u64,
    pub scheduled_today: u64,
    pub units_available: i64,
    pub upcoming_blackouts: Vec<crate::entities::blackout_date::Model>,
    pub recent_orders: Vec<(booking::Model, Option<product::Model>)>,
}

/// Bookings and their pickup requests.
#[derive(Clone)]
pub struct BookingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl BookingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db,
            event_sender,
        }
    }

    /// Persists a booking for a payment that has already been verified upstream.
    ///
    /// Replaying the same intent returns the booking it already produced.
    #[instrument(skip(self, new_booking, payment), fields(product_id = new_booking.product_id, intent_id = %payment.id))]
    pub async fn create_booking(
        &self,
        new_booking: NewBooking,
        payment: &VerifiedIntent,
    ) -> Result<booking::Model, ServiceError> {
        if !payment.status.is_succeeded() {
            return Err(ServiceError::PaymentNotCompleted);
        }
        if new_booking.rental_months < 1 {
            return Err(ServiceError::ValidationError(
                "rental_months must be at least 1".to_string(),
            ));
        }
        new_booking.customer.validate()?;

        let quote = new_booking.quote;
        if compute_total(quote.monthly_rate, new_booking.rental_months, quote.transport_fee) != quote.total {
            return Err(ServiceError::ValidationError("price quote does not add up".to_string()));
        }
        if payment.amount != to_cents(quote.total)? {
            warn!(charged = payment.amount, quoted = %quote.total, "charged amount differs from the quote");
            counter!("rentals.payments.amount_mismatch", 1);
            return Err(ServiceError::PaymentNotCompleted);
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        let mut product_query = Product::find_by_id(new_booking.product_id);
        if db.get_database_backend() != DbBackend::Sqlite {
            product_query = product_query.lock_exclusive();
        }
        let product = product_query
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {}", new_booking.product_id)))?;

        // Must run after the product lock is taken.
        if let Some(existing) = self.booking_for_intent(&txn, &payment.id).await? {
            txn.commit().await?;
            info!(booking_id = %existing.booking_id, "payment intent already produced a booking");
            return Ok(existing);
        }

        if !product.is_active {
            return Err(ServiceError::ValidationError(format!(
                "{} is no longer available",
                product.name
            )));
        }

        let remaining = availability::available_units(&txn, &product, new_booking.drop_off_date).await?;
        if remaining < 1 {
            warn!(product_id = product.id, date = %new_booking.drop_off_date, "last unit taken before payment completed");
            counter!("rentals.bookings.stock_conflicts", 1);
            return Err(ServiceError::InsufficientStock(format!(
                "no {} units left for {}",
                product.name, new_booking.drop_off_date
            )));
        }

        let now = Utc::now();
        let customer = new_booking.customer;

        let created = booking::ActiveModel {
            booking_id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            customer_name: Set(customer.customer_name.trim().to_string()),
            customer_email: Set(customer.customer_email.trim().to_string()),
            customer_phone: Set(customer.customer_phone.trim().to_string()),
            delivery_address: Set(customer.delivery_address),
            delivery_city: Set(customer.delivery_city),
            delivery_state: Set(customer.delivery_state),
            delivery_zip: Set(customer.delivery_zip),
            delivery_notes: Set(customer.delivery_notes),
            drop_off_date: Set(new_booking.drop_off_date),
            pickup_date: Set(None),
            rental_months: Set(new_booking.rental_months),
            monthly_rate: Set(quote.monthly_rate),
            transport_fee: Set(quote.transport_fee),
            total_amount: Set(quote.total),
            stripe_payment_intent_id: Set(Some(payment.id.clone())),
            stripe_charge_id: Set(payment.latest_charge.clone()),
            payment_status: Set(PaymentStatus::Paid),
            status: Set(BookingStatus::Confirmed),
            confirmation_email_sent: Set(false),
            confirmation_sms_sent: Set(false),
            drop_off_reminder_sent: Set(false),
            pickup_reminder_sent: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            confirmed_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await;

        let created = match created {
            Ok(created) => created,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                txn.rollback().await?;
                return self
                    .booking_for_intent(db, &payment.id)
                    .await?
                    .ok_or(ServiceError::DatabaseError(err));
            }
            Err(err) => return Err(err.into()),
        };

        txn.commit().await?;

        counter!("rentals.bookings.created", 1, "product" => product.slug.clone());
        info!(booking_id = %created.booking_id, total = %created.total_amount, "booking created");

        self.event_sender
            .send_or_log(Event::BookingConfirmed {
                booking_id: created.booking_id,
                product_id: created.product_id,
                total_amount: created.total_amount,
            })
            .await;

        Ok(created)
    }

    async fn booking_for_intent<C: ConnectionTrait>(
        &self,
        conn: &C,
        intent_id: &str,
    ) -> Result<Option<booking::Model>, ServiceError> {
        Ok(Booking::find()
            .filter(booking::Column::StripePaymentIntentId.eq(intent_id))
            .one(conn)
            .await?)
    }

    /// Booking a customer may schedule a pickup for.
    pub async fn find_eligible_for_pickup(
        &self,
        booking_id: Uuid,
        customer_email: &str,
    ) -> Result<booking::Model, ServiceError> {
        eligible_for_pickup(&*self.db, booking_id, customer_email).await
    }

    /// Records the pickup request and moves the booking to `pickup_scheduled`.
    #[instrument(skip(self, request, payment), fields(booking_id = %request.booking_id))]
    pub async fn schedule_pickup(
        &self,
        request: SchedulePickup,
        payment: PickupPayment,
        today: NaiveDate,
    ) -> Result<(booking::Model, pickup_request::Model), ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let booking = eligible_for_pickup(&txn, request.booking_id, &request.customer_email).await?;
        validate_pickup_date(&booking, request.requested_pickup_date, today)?;

        let now = Utc::now();
        let pickup_address = request
            .pickup_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let pickup = pickup_request::ActiveModel {
            booking_id: Set(booking.id),
            requested_pickup_date: Set(request.requested_pickup_date),
            pickup_address: Set(pickup_address),
            pickup_notes: Set(request.pickup_notes),
            stripe_payment_intent_id: Set(payment.intent_id),
            payment_status: Set(payment.status),
            pickup_email_sent: Set(false),
            pickup_sms_sent: Set(false),
            created_at: Set(now),
            confirmed_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::PickupAlreadyScheduled,
            _ => ServiceError::DatabaseError(err),
        })?;

        let old_status = booking.status;
        let mut active: booking::ActiveModel = booking.into();
        active.status = Set(BookingStatus::PickupScheduled);
        active.pickup_date = Set(Some(request.requested_pickup_date));
        active.updated_at = Set(now);
        let booking = active.update(&txn).await?;

        txn.commit().await?;
        info!(pickup_date = %pickup.requested_pickup_date, "pickup scheduled");

        self.event_sender
            .send_or_log(Event::PickupScheduled {
                booking_id: booking.booking_id,
                requested_pickup_date: pickup.requested_pickup_date,
            })
            .await;
        self.event_sender
            .send_or_log(Event::BookingStatusChanged {
                booking_id: booking.booking_id,
                old_status,
                new_status: booking.status,
            })
            .await;

        Ok((booking, pickup))
    }

    /// Staff status change, checked against the transition table.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        booking_id: Uuid,
        new_status: BookingStatus,
    ) -> Result<booking::Model, ServiceError> {
        let booking = self.find_by_public_id(booking_id).await?;
        let old_status = booking.status;

        if old_status == new_status {
            return Ok(booking);
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "cannot move a {old_status} booking to {new_status}"
            )));
        }

        let mut active: booking::ActiveModel = booking.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(%booking_id, %old_status, %new_status, "booking status updated");
        self.event_sender
            .send_or_log(Event::BookingStatusChanged {
                booking_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }

    pub async fn find_by_public_id(&self, booking_id: Uuid) -> Result<booking::Model, ServiceError> {
        Booking::find()
            .filter(booking::Column::BookingId.eq(booking_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("booking {booking_id}")))
    }

    pub async fn get_by_public_id(&self, booking_id: Uuid) -> Result<BookingDetails, ServiceError> {
        let (booking, product) = Booking::find()
            .filter(booking::Column::BookingId.eq(booking_id))
            .find_also_related(Product)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("booking {booking_id}")))?;
        let product = product
            .ok_or_else(|| ServiceError::InternalError(format!("booking {booking_id} has no product")))?;
        let pickup = PickupRequest::find()
            .filter(pickup_request::Column::BookingId.eq(booking.id))
            .one(&*self.db)
            .await?;

        Ok(BookingDetails {
            booking,
            product,
            pickup,
        })
    }

    /// Newest-first order list with the dashboard filters.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: BookingFilter,
        today: NaiveDate,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<(booking::Model, Option<product::Model>)>, u64), ServiceError> {
        let mut query = Booking::find().order_by_desc(booking::Column::CreatedAt);

        if let Some(status) = filter.status {
            query = query.filter(booking::Column::Status.eq(status));
        }
        match filter.date {
            Some(DateFilter::Today) => {
                query = query.filter(booking::Column::DropOffDate.eq(today));
            }
            Some(DateFilter::Week) => {
                query = query.filter(
                    booking::Column::DropOffDate.between(today, today + Duration::days(7)),
                );
            }
            Some(DateFilter::All) | None => {}
        }

        let paginator = query.find_also_related(Product).paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    #[instrument(skip(self))]
    pub async fn dashboard_stats(&self, today: NaiveDate) -> Result<DashboardStats, ServiceError> {
        let db = &*self.db;
        let (day_start, day_end) = day_bounds(today);

        let new_orders = Booking::find()
            .filter(booking::Column::CreatedAt.gte(day_start))
            .filter(booking::Column::CreatedAt.lt(day_end))
            .count(db)
            .await?;

        let scheduled_today = Booking::find()
            .filter(booking::Column::DropOffDate.eq(today))
            .filter(booking::Column::Status.eq(BookingStatus::Confirmed))
            .count(db)
            .await?;

        let stock: i64 = Product::find()
            .all(db)
            .await?
            .iter()
            .map(|p| i64::from(p.stock_quantity))
            .sum();
        let out = Booking::find().filter(occupying_on(today)).count(db).await?;
        let units_available = stock - out as i64;

        let upcoming_blackouts = crate::entities::blackout_date::Entity::find()
            .filter(crate::entities::blackout_date::Column::Date.gte(today))
            .order_by_asc(crate::entities::blackout_date::Column::Date)
            .limit(3)
            .all(db)
            .await?;

        let recent_orders = Booking::find()
            .order_by_desc(booking::Column::CreatedAt)
            .find_also_related(Product)
            .limit(10)
            .all(db)
            .await?;

        Ok(DashboardStats {
            new_orders,
            scheduled_today,
            units_available,
            upcoming_blackouts,
            recent_orders,
        })
    }

    /// Bookings delivering on `date` that have not had their reminder.
    pub async fn due_for_drop_off_reminder(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<booking::Model>, ServiceError> {
        Ok(Booking::find()
            .filter(booking::Column::DropOffDate.eq(date))
            .filter(booking::Column::DropOffReminderSent.eq(false))
            .filter(booking::Column::Status.is_in([BookingStatus::Confirmed, BookingStatus::InProgress]))
            .all(&*self.db)
            .await?)
    }

    /// Bookings collected on `date` that have a pickup request and no reminder yet.
    pub async fn pickups_due_for_reminder(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<booking::Model>, ServiceError> {
        Ok(Booking::find()
            .inner_join(PickupRequest)
            .filter(booking::Column::PickupDate.eq(date))
            .filter(booking::Column::PickupReminderSent.eq(false))
            .filter(booking::Column::Status.eq(BookingStatus::PickupScheduled))
            .all(&*self.db)
            .await?)
    }
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

pub(crate) fn validate_pickup_date(
    booking: &booking::Model,
    requested: NaiveDate,
    today: NaiveDate,
) -> Result<(), ServiceError> {
    if requested <= today {
        return Err(ServiceError::ValidationError(
            "pickup date must be in the future".to_string(),
        ));
    }
    if requested < booking.drop_off_date {
        return Err(ServiceError::ValidationError(format!(
            "pickup date cannot be before the drop-off date {}",
            booking.drop_off_date
        )));
    }
    Ok(())
}

async fn eligible_for_pickup<C: ConnectionTrait>(
    conn: &C,
    booking_id: Uuid,
    customer_email: &str,
) -> Result<booking::Model, ServiceError> {
    let booking = Booking::find()
        .filter(booking::Column::BookingId.eq(booking_id))
        .one(conn)
        .await?
        .filter(|b| email_matches(&b.customer_email, customer_email))
        .ok_or(ServiceError::BookingNotFound)?;

    let existing = PickupRequest::find()
        .filter(pickup_request::Column::BookingId.eq(booking.id))
        .count(conn)
        .await?;
    if existing > 0 {
        return Err(ServiceError::PickupAlreadyScheduled);
    }

    if !booking.status.allows_pickup() {
        return Err(ServiceError::BookingNotFound);
    }
    Ok(booking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn booking_on(drop_off: NaiveDate) -> booking::Model {
        let now = Utc::now();
        booking::Model {
            id: 1,
            booking_id: Uuid::new_v4(),
            product_id: 1,
            customer_name: "Ada".into(),
            customer_email: "Ada@Example.com".into(),
            customer_phone: "5551234567".into(),
            delivery_address: "1 Main St".into(),
            delivery_city: "Springfield".into(),
            delivery_state: "IL".into(),
            delivery_zip: "62701".into(),
            delivery_notes: String::new(),
            drop_off_date: drop_off,
            pickup_date: None,
            rental_months: 1,
            monthly_rate: dec!(150.00),
            transport_fee: dec!(80.00),
            total_amount: dec!(230.00),
            stripe_payment_intent_id: None,
            stripe_charge_id: None,
            payment_status: PaymentStatus::Paid,
            status: BookingStatus::Confirmed,
            confirmation_email_sent: false,
            confirmation_sms_sent: false,
            drop_off_reminder_sent: false,
            pickup_reminder_sent: false,
            created_at: now,
            updated_at: now,
            confirmed_at: Some(now),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn total_is_rate_times_months_plus_transport() {
        assert_eq!(compute_total(dec!(150.00), 3, dec!(80.00)), dec!(530.00));
        assert_eq!(compute_total(dec!(99.99), 1, dec!(0)), dec!(99.99));
    }

    #[test]
    fn email_comparison_ignores_case_and_padding() {
        assert!(email_matches("Ada@Example.com", " ada@example.COM "));
        assert!(!email_matches("ada@example.com", "eve@example.com"));
    }

    #[test]
    fn pickup_date_must_be_future_and_after_drop_off() {
        let booking = booking_on(ymd(2024, 6, 10));
        let today = ymd(2024, 6, 5);

        assert!(validate_pickup_date(&booking, ymd(2024, 6, 5), today).is_err());
        assert!(validate_pickup_date(&booking, ymd(2024, 6, 9), today).is_err());
        assert!(validate_pickup_date(&booking, ymd(2024, 6, 10), today).is_ok());
        assert!(validate_pickup_date(&booking, ymd(2024, 7, 1), today).is_ok());
    }

    #[test]
    fn day_bounds_cover_one_utc_day() {
        let (start, end) = day_bounds(ymd(2024, 6, 1));
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(start.date_naive(), ymd(2024, 6, 1));
    }

    mod with_database {
        use super::*;
        use crate::{
            entities::product::ProductCategory,
            services::payments::IntentStatus,
        };
        use std::collections::HashMap;
        use tokio::sync::mpsc;

        struct Fixture {
            service: BookingService,
            db: Arc<DatabaseConnection>,
            product_id: i32,
            _dir: tempfile::TempDir,
            _events: mpsc::Receiver<Event>,
        }

        async fn fixture() -> Fixture {
            let dir = tempfile::tempdir().unwrap();
            let url = format!("sqlite://{}?mode=rwc", dir.path().join("bookings.db").display());
            let db = Arc::new(sea_orm::Database::connect(url).await.unwrap());
            crate::db::run_migrations(&db).await.unwrap();

            let (tx, rx) = mpsc::channel(16);
            let now = Utc::now();
            let product = product::ActiveModel {
                name: Set("8ft Pod".into()),
                slug: Set("8ft-pod".into()),
                category: Set(ProductCategory::StoragePod),
                description: Set(String::new()),
                size_description: Set("8 x 7 x 7 ft".into()),
                monthly_rate: Set(dec!(75.00)),
                image_url: Set(None),
                stock_quantity: Set(2),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&*db)
            .await
            .unwrap();

            Fixture {
                service: BookingService::new(db.clone(), EventSender::new(tx)),
                db,
                product_id: product.id,
                _dir: dir,
                _events: rx,
            }
        }

        fn new_booking(product_id: i32, quote: PriceQuote) -> NewBooking {
            NewBooking {
                product_id,
                drop_off_date: Utc::now().date_naive() + Duration::days(4),
                rental_months: 2,
                quote,
                customer: CustomerDetails {
                    customer_name: "Ada Lovelace".into(),
                    customer_email: "ada@example.com".into(),
                    customer_phone: "(555) 123-4567".into(),
                    delivery_address: "1 Main St".into(),
                    delivery_city: "Springfield".into(),
                    delivery_state: "IL".into(),
                    delivery_zip: "62701".into(),
                    delivery_notes: String::new(),
                },
            }
        }

        fn quote() -> PriceQuote {
            PriceQuote {
                monthly_rate: dec!(75.00),
                transport_fee: dec!(80.00),
                total: dec!(230.00),
            }
        }

        fn paid(id: &str, amount: i64) -> VerifiedIntent {
            VerifiedIntent {
                id: id.into(),
                status: IntentStatus::Succeeded,
                amount,
                latest_charge: Some(format!("ch_{id}")),
                metadata: HashMap::new(),
            }
        }

        #[tokio::test]
        async fn one_intent_yields_one_booking() {
            let fx = fixture().await;
            let payment = paid("pi_once", 23_000);

            let first = fx
                .service
                .create_booking(new_booking(fx.product_id, quote()), &payment)
                .await
                .unwrap();
            let second = fx
                .service
                .create_booking(new_booking(fx.product_id, quote()), &payment)
                .await
                .unwrap();

            assert_eq!(first.booking_id, second.booking_id);
            assert_eq!(first.total_amount, dec!(230.00));
            assert_eq!(Booking::find().count(&*fx.db).await.unwrap(), 1);

            let mut duplicate: booking::ActiveModel = first.into();
            duplicate.id = sea_orm::ActiveValue::NotSet;
            duplicate.booking_id = Set(Uuid::new_v4());
            let err = duplicate.insert(&*fx.db).await.unwrap_err();
            assert!(matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))));
        }

        #[tokio::test]
        async fn charge_must_match_the_quote() {
            let fx = fixture().await;

            let result = fx
                .service
                .create_booking(new_booking(fx.product_id, quote()), &paid("pi_short", 10_000))
                .await;
            assert!(matches!(result, Err(ServiceError::PaymentNotCompleted)));

            let inconsistent = PriceQuote {
                total: dec!(100.00),
                ..quote()
            };
            let result = fx
                .service
                .create_booking(new_booking(fx.product_id, inconsistent), &paid("pi_odd", 10_000))
                .await;
            assert!(matches!(result, Err(ServiceError::ValidationError(_))));

            assert_eq!(Booking::find().count(&*fx.db).await.unwrap(), 0);
        }
    }
}
