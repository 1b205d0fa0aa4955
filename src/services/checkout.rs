/*!
 * # Checkout
 *
 * Multi-step guest checkout. Each step writes into a server-side draft
 * addressed by an opaque token; drafts slide forward by the configured
 * TTL on every write and are swept once expired. Nothing here creates a
 * booking: that happens after the payment is verified.
 */

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        checkout_draft::{self, DraftKind, Entity as CheckoutDraft},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    services::{
        availability::{self, min_bookable_date, AvailabilityService},
        bookings::{compute_total, validate_pickup_date, BookingService, CustomerDetails, PriceQuote},
        payments::{to_cents, PaymentGateway},
        pricing::PricingService,
    },
};

pub static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9(][0-9 ().\-]{6,19}$").unwrap());
pub static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").unwrap());

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDraftData {
    pub product_id: i32,
    pub drop_off_date: NaiveDate,
    pub rental_months: i32,
    #[serde(default)]
    pub distance_km: Option<Decimal>,
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
    /// Set with the payment intent; the booking is recorded at these prices.
    #[serde(default)]
    pub quote: Option<PriceQuote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupDraftData {
    pub booking_id: Uuid,
    pub customer_email: String,
    pub requested_pickup_date: NaiveDate,
    #[serde(default)]
    pub pickup_notes: String,
    #[serde(default)]
    pub pickup_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SelectDatesRequest {
    pub drop_off_date: NaiveDate,
    #[validate(range(min = 1, max = 24, message = "rental must be between 1 and 24 months"))]
    pub rental_months: i32,
    pub distance_km: Option<Decimal>,
    /// Existing draft to overwrite
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StartPickupRequest {
    pub booking_id: Uuid,
    #[validate(email(message = "enter the email used for the booking"))]
    pub customer_email: String,
    pub requested_pickup_date: NaiveDate,
    #[serde(default)]
    pub pickup_notes: String,
    pub pickup_address: Option<String>,
}

/// Token and expiry of a checkout draft.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DraftHandle {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutSummary {
    pub token: String,
    pub product_name: String,
    pub product_slug: String,
    pub drop_off_date: NaiveDate,
    pub rental_months: i32,
    pub monthly_rate: Decimal,
    pub monthly_cost: Decimal,
    pub transport_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub client_secret: String,
    pub payment_intent_id: String,
    pub publishable_key: Option<String>,
    pub customer: CustomerDetails,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PickupIntent {
    pub token: String,
    pub pickup_fee: Decimal,
    pub currency: String,
    /// Absent when the fee is waived
    pub client_secret: Option<String>,
    pub payment_intent_id: Option<String>,
    pub publishable_key: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingService,
    availability: AvailabilityService,
    bookings: BookingService,
    ttl: chrono::Duration,
    currency: String,
    publishable_key: Option<String>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingService,
        bookings: BookingService,
        ttl: std::time::Duration,
        currency: impl Into<String>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            availability: AvailabilityService::new(db.clone()),
            db,
            gateway,
            pricing,
            bookings,
            ttl,
            currency: currency.into(),
            publishable_key: None,
        }
    }

    /// Key the browser needs to confirm an intent with the provider.
    pub fn with_publishable_key(mut self, key: Option<String>) -> Self {
        self.publishable_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<product::Model, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {slug}")))
    }

    /// Live draft of `kind`; anything missing, expired or of the other kind is a lapsed session.
    async fn load_draft<T: DeserializeOwned>(
        &self,
        token: &str,
        kind: DraftKind,
    ) -> Result<(checkout_draft::Model, T), ServiceError> {
        let draft = CheckoutDraft::find_by_id(token.to_string())
            .one(&*self.db)
            .await?
            .filter(|d| d.kind == kind && !d.is_expired(Utc::now()))
            .ok_or(ServiceError::SessionExpired)?;
        let data = serde_json::from_value(draft.data.clone()).map_err(|_| ServiceError::SessionExpired)?;
        Ok((draft, data))
    }

    async fn write_draft<T: Serialize>(
        &self,
        existing: Option<checkout_draft::Model>,
        kind: DraftKind,
        data: &T,
        payment_intent_id: Option<String>,
    ) -> Result<DraftHandle, ServiceError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let data = serde_json::to_value(data)?;

        let saved = match existing {
            Some(draft) => {
                let mut active: checkout_draft::ActiveModel = draft.into();
                active.kind = Set(kind);
                active.data = Set(data);
                active.payment_intent_id = Set(payment_intent_id);
                active.expires_at = Set(expires_at);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                checkout_draft::ActiveModel {
                    token: Set(new_token()),
                    kind: Set(kind),
                    data: Set(data),
                    payment_intent_id: Set(payment_intent_id),
                    expires_at: Set(expires_at),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        Ok(DraftHandle {
            token: saved.token,
            expires_at: saved.expires_at,
        })
    }

    /// Step 2: product, drop-off date and duration.
    #[instrument(skip(self, request), fields(slug = %slug))]
    pub async fn select_dates(
        &self,
        slug: &str,
        request: SelectDatesRequest,
        today: NaiveDate,
    ) -> Result<DraftHandle, ServiceError> {
        request.validate()?;
        if let Some(distance) = request.distance_km {
            if distance.is_sign_negative() {
                return Err(ServiceError::ValidationError("distance_km must not be negative".into()));
            }
        }

        let product = self.find_product_by_slug(slug).await?;
        let date = request.drop_off_date;

        if date < min_bookable_date(today) {
            return Err(ServiceError::ValidationError(
                "drop-off date must be tomorrow or later".into(),
            ));
        }
        if availability::is_blocked(&*self.db, product.id, date).await? {
            return Err(ServiceError::ValidationError(format!(
                "drop-offs are not available on {date}"
            )));
        }
        if self.availability.available_units(&product, date).await? < 1 {
            return Err(ServiceError::InsufficientStock(format!(
                "no {} units available on {date}",
                product.name
            )));
        }

        // An expired or foreign token just starts a fresh draft.
        let existing = match request.token.as_deref() {
            Some(token) => CheckoutDraft::find_by_id(token.to_string())
                .one(&*self.db)
                .await?
                .filter(|d| d.kind == DraftKind::Booking && !d.is_expired(Utc::now())),
            None => None,
        };

        let data = BookingDraftData {
            product_id: product.id,
            drop_off_date: date,
            rental_months: request.rental_months,
            distance_km: request.distance_km,
            customer: None,
            quote: None,
        };
        let handle = self
            .write_draft(existing, DraftKind::Booking, &data, None)
            .await?;
        info!(product_id = product.id, %date, months = request.rental_months, "checkout dates selected");
        Ok(handle)
    }

    /// Step 3: customer and delivery details.
    #[instrument(skip(self, token, details))]
    pub async fn customer_details(
        &self,
        token: &str,
        details: CustomerDetails,
    ) -> Result<DraftHandle, ServiceError> {
        let (draft, mut data) = self.load_draft::<BookingDraftData>(token, DraftKind::Booking).await?;
        details.validate()?;

        data.customer = Some(CustomerDetails {
            customer_name: details.customer_name.trim().to_string(),
            customer_email: details.customer_email.trim().to_string(),
            customer_phone: details.customer_phone.trim().to_string(),
            delivery_address: details.delivery_address.trim().to_string(),
            delivery_city: details.delivery_city.trim().to_string(),
            delivery_state: details.delivery_state.trim().to_string(),
            delivery_zip: details.delivery_zip.trim().to_string(),
            delivery_notes: details.delivery_notes,
        });
        self.write_draft(Some(draft), DraftKind::Booking, &data, None)
            .await
    }

    /// Step 4: price the draft and open a payment intent for it.
    #[instrument(skip(self, token))]
    pub async fn summary(&self, token: &str) -> Result<CheckoutSummary, ServiceError> {
        let (draft, mut data) = self.load_draft::<BookingDraftData>(token, DraftKind::Booking).await?;
        let customer = data.customer.clone().ok_or_else(|| {
            ServiceError::ValidationError("complete your contact details first".into())
        })?;

        let product = Product::find_by_id(data.product_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::SessionExpired)?;

        let monthly_cost = product.monthly_rate * Decimal::from(data.rental_months);
        let transport_fee = self.pricing.transport_fee(data.distance_km);
        let total = compute_total(product.monthly_rate, data.rental_months, transport_fee);

        let metadata = HashMap::from([
            ("product_name".to_string(), product.name.clone()),
            ("customer_email".to_string(), customer.customer_email.clone()),
            ("drop_off_date".to_string(), data.drop_off_date.to_string()),
        ]);
        let intent = self
            .gateway
            .create_intent(to_cents(total)?, &self.currency, metadata)
            .await?;

        data.quote = Some(PriceQuote {
            monthly_rate: product.monthly_rate,
            transport_fee,
            total,
        });
        let handle = self
            .write_draft(Some(draft), DraftKind::Booking, &data, Some(intent.id.clone()))
            .await?;

        Ok(CheckoutSummary {
            token: handle.token,
            product_name: product.name,
            product_slug: product.slug,
            drop_off_date: data.drop_off_date,
            rental_months: data.rental_months,
            monthly_rate: product.monthly_rate,
            monthly_cost,
            transport_fee,
            total,
            currency: self.currency.clone(),
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            publishable_key: self.publishable_key.clone(),
            customer,
        })
    }

    pub async fn load_booking_draft(
        &self,
        token: &str,
    ) -> Result<(checkout_draft::Model, BookingDraftData), ServiceError> {
        self.load_draft(token, DraftKind::Booking).await
    }

    /// Verifies the booking and requested date, then opens a pickup draft.
    #[instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    pub async fn start_pickup(
        &self,
        request: StartPickupRequest,
        today: NaiveDate,
    ) -> Result<DraftHandle, ServiceError> {
        request.validate()?;
        let booking = self
            .bookings
            .find_eligible_for_pickup(request.booking_id, &request.customer_email)
            .await?;

        validate_pickup_date(&booking, request.requested_pickup_date, today)?;

        let data = PickupDraftData {
            booking_id: booking.booking_id,
            customer_email: request.customer_email.trim().to_string(),
            requested_pickup_date: request.requested_pickup_date,
            pickup_notes: request.pickup_notes,
            pickup_address: request.pickup_address,
        };
        self.write_draft(None, DraftKind::Pickup, &data, None).await
    }

    /// Opens an intent for the pickup fee, or reports it waived when the fee is zero.
    #[instrument(skip(self, token))]
    pub async fn pickup_payment_intent(&self, token: &str) -> Result<PickupIntent, ServiceError> {
        let (draft, data) = self.load_draft::<PickupDraftData>(token, DraftKind::Pickup).await?;
        let fee = self.pricing.pickup_fee();

        if fee <= Decimal::ZERO {
            let handle = self.write_draft(Some(draft), DraftKind::Pickup, &data, None).await?;
            return Ok(PickupIntent {
                token: handle.token,
                pickup_fee: Decimal::ZERO,
                currency: self.currency.clone(),
                client_secret: None,
                payment_intent_id: None,
                publishable_key: None,
            });
        }

        let metadata = HashMap::from([
            ("booking_id".to_string(), data.booking_id.to_string()),
            ("type".to_string(), "pickup_fee".to_string()),
        ]);
        let intent = self
            .gateway
            .create_intent(to_cents(fee)?, &self.currency, metadata)
            .await?;
        let handle = self
            .write_draft(Some(draft), DraftKind::Pickup, &data, Some(intent.id.clone()))
            .await?;

        Ok(PickupIntent {
            token: handle.token,
            pickup_fee: fee,
            currency: self.currency.clone(),
            client_secret: Some(intent.client_secret),
            payment_intent_id: Some(intent.id),
            publishable_key: self.publishable_key.clone(),
        })
    }

    pub async fn load_pickup_draft(
        &self,
        token: &str,
    ) -> Result<(checkout_draft::Model, PickupDraftData), ServiceError> {
        self.load_draft(token, DraftKind::Pickup).await
    }

    pub async fn delete_draft(&self, token: &str) -> Result<(), ServiceError> {
        CheckoutDraft::delete_by_id(token.to_string())
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Deletes every draft that expired before `now`.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = CheckoutDraft::delete_many()
            .filter(checkout_draft::Column::ExpiresAt.lte(now))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(purged = result.rows_affected, "expired checkout drafts removed");
        }
        Ok(result.rows_affected)
    }
}
