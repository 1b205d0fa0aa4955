/*!
 * # Payments
 *
 * Gateway abstraction over a Stripe-style REST API, server-side
 * verification of confirmed payments, and webhook reconciliation.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        booking::{self, Entity as Booking, PaymentStatus},
        pickup_request::{self, Entity as PickupRequest, PickupPaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{NotificationDispatcher, NotificationKind},
    services::{
        bookings::{BookingService, NewBooking, PickupPayment, SchedulePickup},
        checkout::CheckoutService,
    },
};

type HmacSha256 = Hmac<Sha256>;

/// How long a processed webhook event id is remembered.
const WEBHOOK_DEDUP_TTL_SECS: u64 = 86_400;

/// Stripe-style payment intent status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, IntentStatus::Succeeded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

/// Intent state as reported by the provider, never by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedIntent {
    pub id: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CreatedIntent, ServiceError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<VerifiedIntent, ServiceError>;
}

/// Amount in the currency's minor unit.
pub fn to_cents(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError(format!("amount {amount} is out of range")))
}

/// REST client for the hosted payment provider.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    fn upstream_failure(context: &str, detail: impl std::fmt::Display) -> ServiceError {
        counter!("rentals.payments.gateway_failures", 1, "operation" => context.to_string());
        error!(operation = context, error = %detail, "payment gateway call failed");
        ServiceError::GatewayError(format!("{context}: {detail}"))
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        context: &str,
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::upstream_failure(context, format!("HTTP {status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Self::upstream_failure(context, e))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, metadata))]
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CreatedIntent, ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), amount_cents.to_string()),
            ("currency".into(), currency.to_string()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| Self::upstream_failure("create_intent", e))?;

        let intent: CreatedIntent = Self::parse("create_intent", response).await?;
        debug!(intent_id = %intent.id, "payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<VerifiedIntent, ServiceError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| Self::upstream_failure("retrieve_intent", e))?;

        Self::parse("retrieve_intent", response).await
    }
}

/// Gateway used when no provider key is configured. Every call fails.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_intent(
        &self,
        _amount_cents: i64,
        _currency: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<CreatedIntent, ServiceError> {
        Err(ServiceError::GatewayError("payment provider is not configured".into()))
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> Result<VerifiedIntent, ServiceError> {
        Err(ServiceError::GatewayError("payment provider is not configured".into()))
    }
}

/// Result of a successful checkout payment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentOutcome {
    pub success: bool,
    pub booking_id: Uuid,
    pub redirect_url: String,
}

// ---------------------------------------------------------------------------
// Webhook signatures
// ---------------------------------------------------------------------------

/// HMAC-SHA256 signature over `"{timestamp}.{body}"`, hex encoded.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Timestamp and candidate signatures pulled from request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parses `t=…,v1=…[,v1=…]`.
    pub fn parse_stripe(value: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in value.split(',') {
            let (key, val) = part.trim().split_once('=')?;
            match key {
                "t" => timestamp = val.parse::<i64>().ok(),
                "v1" => signatures.push(val.to_string()),
                _ => {}
            }
        }
        Some(Self {
            timestamp: timestamp?,
            signatures,
        })
        .filter(|h| !h.signatures.is_empty())
    }

    pub fn from_headers(headers: &axum::http::HeaderMap) -> Option<Self> {
        if let Some(value) = headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
            return Self::parse_stripe(value);
        }

        let timestamp = headers
            .get("x-timestamp")
            .and_then(|v| v.to_str().ok())?
            .trim()
            .parse::<i64>()
            .ok()?;
        let signature = headers.get("x-signature").and_then(|v| v.to_str().ok())?;
        let signature = signature.trim().trim_start_matches("sha256=").to_string();
        Some(Self {
            timestamp,
            signatures: vec![signature],
        })
    }
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs,
        }
    }

    /// Checks the signature headers against `body` at time `now` (unix seconds).
    pub fn verify(
        &self,
        headers: &axum::http::HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<(), ServiceError> {
        let Some(secret) = self.secret.as_deref() else {
            warn!("payment webhook secret not configured, skipping signature check");
            return Ok(());
        };

        let header = SignatureHeader::from_headers(headers)
            .ok_or_else(|| ServiceError::Unauthorized("missing webhook signature".into()))?;

        let stale = now
            .checked_sub(header.timestamp)
            .map_or(true, |age| age.unsigned_abs() > self.tolerance_secs);
        if stale {
            return Err(ServiceError::Unauthorized("webhook timestamp outside tolerance".into()));
        }

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("invalid webhook secret: {e}")))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);

        let valid = header.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|raw| mac.clone().verify_slice(&raw).is_ok())
                .unwrap_or(false)
        });

        if valid {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized("invalid webhook signature".into()))
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    fn is_charge(&self) -> bool {
        self.event_type.starts_with("charge.")
    }

    /// Intent the event refers to, whether the object is a charge or an intent.
    fn intent_id(&self) -> Option<&str> {
        let field = if self.is_charge() { "payment_intent" } else { "id" };
        self.data.object.get(field).and_then(|v| v.as_str())
    }

    fn charge_id(&self) -> Option<&str> {
        let field = if self.is_charge() { "id" } else { "latest_charge" };
        self.data.object.get(field).and_then(|v| v.as_str())
    }
}

/// What reconciliation did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    ChargeRecorded,
    ChargeAlreadyRecorded,
    MarkedFailed,
    MarkedRefunded,
    Duplicate,
    Unmatched,
    Ignored,
}

/// Confirms checkout payments and reconciles provider webhooks.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    checkout: CheckoutService,
    bookings: BookingService,
    notifier: NotificationDispatcher,
    event_sender: EventSender,
    verifier: WebhookVerifier,
    redis: Option<Arc<redis::Client>>,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        checkout: CheckoutService,
        bookings: BookingService,
        notifier: NotificationDispatcher,
        event_sender: EventSender,
        verifier: WebhookVerifier,
        redis: Option<Arc<redis::Client>>,
    ) -> Self {
        Self {
            db,
            gateway,
            checkout,
            bookings,
            notifier,
            event_sender,
            verifier,
            redis,
        }
    }

    /// Re-verifies the intent with the provider and turns the draft into a booking.
    #[instrument(skip(self, token))]
    pub async fn process_confirmed_payment(
        &self,
        token: &str,
        intent_id: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        let (draft, data) = self.checkout.load_booking_draft(token).await?;

        if draft.payment_intent_id.as_deref() != Some(intent_id) {
            warn!(intent_id, "payment intent does not belong to this checkout");
            return Err(ServiceError::PaymentNotCompleted);
        }

        let intent = self.gateway.retrieve_intent(intent_id).await?;
        if !intent.status.is_succeeded() {
            info!(intent_id, status = ?intent.status, "payment not completed");
            counter!("rentals.payments.not_completed", 1);
            return Err(ServiceError::PaymentNotCompleted);
        }

        let customer = data.customer.ok_or_else(|| {
            ServiceError::ValidationError("customer details are missing".into())
        })?;
        let quote = data.quote.ok_or(ServiceError::PaymentNotCompleted)?;
        let booking = self
            .bookings
            .create_booking(
                NewBooking {
                    product_id: data.product_id,
                    drop_off_date: data.drop_off_date,
                    rental_months: data.rental_months,
                    quote,
                    customer,
                },
                &intent,
            )
            .await?;

        self.checkout.delete_draft(token).await?;
        self.notifier
            .notify(NotificationKind::BookingConfirmation, booking.id)
            .await;

        Ok(PaymentOutcome {
            success: true,
            booking_id: booking.booking_id,
            redirect_url: format!("/booking/confirmation/{}/", booking.booking_id),
        })
    }

    /// Settles the pickup fee (or waives it) and records the pickup request.
    #[instrument(skip(self, token))]
    pub async fn process_pickup_payment(
        &self,
        token: &str,
        intent_id: Option<&str>,
    ) -> Result<PaymentOutcome, ServiceError> {
        let (draft, data) = self.checkout.load_pickup_draft(token).await?;

        let payment = match draft.payment_intent_id.as_deref() {
            None => PickupPayment {
                intent_id: None,
                status: PickupPaymentStatus::Waived,
            },
            Some(issued) => {
                let intent_id = intent_id.ok_or(ServiceError::PaymentNotCompleted)?;
                if issued != intent_id {
                    return Err(ServiceError::PaymentNotCompleted);
                }
                let intent = self.gateway.retrieve_intent(intent_id).await?;
                if !intent.status.is_succeeded() {
                    return Err(ServiceError::PaymentNotCompleted);
                }
                PickupPayment {
                    intent_id: Some(intent.id),
                    status: PickupPaymentStatus::Paid,
                }
            }
        };

        let (booking, pickup) = self
            .bookings
            .schedule_pickup(
                SchedulePickup {
                    booking_id: data.booking_id,
                    customer_email: data.customer_email,
                    requested_pickup_date: data.requested_pickup_date,
                    pickup_notes: data.pickup_notes,
                    pickup_address: data.pickup_address,
                },
                payment,
                Utc::now().date_naive(),
            )
            .await?;

        self.checkout.delete_draft(token).await?;
        self.notifier
            .notify(NotificationKind::PickupConfirmation, pickup.id)
            .await;

        Ok(PaymentOutcome {
            success: true,
            booking_id: booking.booking_id,
            redirect_url: format!("/booking/pickup/confirmed/{}/", booking.booking_id),
        })
    }

    /// Verifies, de-duplicates and applies a provider webhook.
    ///
    /// Only a bad signature is an error; everything else is acknowledged.
    #[instrument(skip(self, headers, body))]
    pub async fn handle_webhook(
        &self,
        headers: &axum::http::HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        if let Err(err) = self.verifier.verify(headers, body, Utc::now().timestamp()) {
            counter!("rentals.payments.webhooks", 1, "outcome" => "rejected");
            return Err(err);
        }

        let event: WebhookEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "unparseable payment webhook acknowledged");
                counter!("rentals.payments.webhooks", 1, "outcome" => "malformed");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        if !self.first_delivery(&event.id).await {
            info!(event_id = %event.id, "duplicate payment webhook");
            counter!("rentals.payments.webhooks", 1, "outcome" => "duplicate");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match self.reconcile(&event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(event_id = %event.id, event_type = %event.event_type, error = %e, "webhook reconciliation failed");
                WebhookOutcome::Ignored
            }
        };

        let label = serde_json::to_value(outcome)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        counter!("rentals.payments.webhooks", 1, "outcome" => label);
        Ok(outcome)
    }

    /// Records the event id; false when it was already seen.
    async fn first_delivery(&self, event_id: &str) -> bool {
        let Some(client) = &self.redis else {
            return true;
        };

        let key = format!("rentals:webhook:{event_id}");
        let result: Result<Option<String>, redis::RedisError> = async {
            let mut conn = client.get_async_connection().await?;
            redis::cmd("SET")
                .arg(&key)
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(WEBHOOK_DEDUP_TTL_SECS)
                .query_async(&mut conn)
                .await
        }
        .await;

        match result {
            Ok(set) => set.is_some(),
            Err(e) => {
                debug!(error = %e, "webhook de-duplication unavailable");
                true
            }
        }
    }

    async fn reconcile(&self, event: &WebhookEvent) -> Result<WebhookOutcome, ServiceError> {
        let Some(intent_id) = event.intent_id() else {
            return Ok(WebhookOutcome::Ignored);
        };

        match event.event_type.as_str() {
            "charge.succeeded" | "payment_intent.succeeded" => {
                let Some(charge_id) = event.charge_id() else {
                    return Ok(WebhookOutcome::Ignored);
                };
                self.record_charge(intent_id, charge_id).await
            }
            "charge.failed" | "payment_intent.payment_failed" => {
                self.set_payment_status(intent_id, PaymentStatus::Failed, event)
                    .await
            }
            "charge.refunded" => {
                let outcome = self
                    .set_payment_status(intent_id, PaymentStatus::Refunded, event)
                    .await?;
                if outcome == WebhookOutcome::Unmatched {
                    return self.refund_pickup(intent_id).await;
                }
                Ok(outcome)
            }
            other => {
                debug!(event_type = other, "unhandled payment webhook");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn record_charge(
        &self,
        intent_id: &str,
        charge_id: &str,
    ) -> Result<WebhookOutcome, ServiceError> {
        let result = Booking::update_many()
            .col_expr(booking::Column::StripeChargeId, Expr::value(charge_id))
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::StripePaymentIntentId.eq(intent_id))
            .filter(
                sea_orm::Condition::any()
                    .add(booking::Column::StripeChargeId.is_null())
                    .add(booking::Column::StripeChargeId.eq("")),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(intent_id, charge_id, "charge id recorded");
            return Ok(WebhookOutcome::ChargeRecorded);
        }

        let exists = Booking::find()
            .filter(booking::Column::StripePaymentIntentId.eq(intent_id))
            .one(&*self.db)
            .await?
            .is_some();
        Ok(if exists {
            WebhookOutcome::ChargeAlreadyRecorded
        } else {
            WebhookOutcome::Unmatched
        })
    }

    async fn set_payment_status(
        &self,
        intent_id: &str,
        status: PaymentStatus,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, ServiceError> {
        let Some(booking) = Booking::find()
            .filter(booking::Column::StripePaymentIntentId.eq(intent_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(WebhookOutcome::Unmatched);
        };

        Booking::update_many()
            .col_expr(booking::Column::PaymentStatus, Expr::value(status))
            .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(booking::Column::Id.eq(booking.id))
            .exec(&*self.db)
            .await?;

        info!(booking_id = %booking.booking_id, %status, "booking payment status reconciled");
        self.event_sender
            .send_or_log(Event::PaymentReconciled {
                booking_id: booking.booking_id,
                payment_status: status,
                event_type: event.event_type.clone(),
            })
            .await;

        Ok(match status {
            PaymentStatus::Refunded => WebhookOutcome::MarkedRefunded,
            _ => WebhookOutcome::MarkedFailed,
        })
    }

    async fn refund_pickup(&self, intent_id: &str) -> Result<WebhookOutcome, ServiceError> {
        let result = PickupRequest::update_many()
            .col_expr(
                pickup_request::Column::PaymentStatus,
                Expr::value(PickupPaymentStatus::Refunded),
            )
            .filter(pickup_request::Column::StripePaymentIntentId.eq(intent_id))
            .exec(&*self.db)
            .await?;

        Ok(if result.rows_affected > 0 {
            WebhookOutcome::MarkedRefunded
        } else {
            WebhookOutcome::Unmatched
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use rust_decimal_macros::dec;

    const SECRET: &str = "whsec_test";

    fn stripe_headers(timestamp: i64, signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            HeaderValue::from_str(&format!("t={timestamp},v1={signature}")).unwrap(),
        );
        headers
    }

    #[test]
    fn cents_round_half_away_from_zero() {
        assert_eq!(to_cents(dec!(230.00)).unwrap(), 23000);
        assert_eq!(to_cents(dec!(79.005)).unwrap(), 7901);
        assert_eq!(to_cents(dec!(0.005)).unwrap(), 1);
        assert_eq!(to_cents(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        let verifier = WebhookVerifier::new(Some(SECRET.into()), 300);
        let body = b"{}";
        let now = 1_700_000_000;

        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            HeaderValue::from_static("t=-9223372036854775808,v1=00"),
        );
        assert!(matches!(
            verifier.verify(&headers, body, now),
            Err(ServiceError::Unauthorized(_))
        ));

        assert!(matches!(
            verifier.verify(&stripe_headers(i64::MAX, "00"), body, -now),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn parses_stripe_signature_header() {
        let header = SignatureHeader::parse_stripe("t=1700000000,v1=abc,v0=old,v1=def").unwrap();
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.signatures, vec!["abc".to_string(), "def".to_string()]);
        assert!(SignatureHeader::parse_stripe("v1=abc").is_none());
        assert!(SignatureHeader::parse_stripe("t=1").is_none());
    }

    #[test]
    fn accepts_valid_signature_and_rejects_tampering() {
        let verifier = WebhookVerifier::new(Some(SECRET.into()), 300);
        let body = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let sig = sign_payload(SECRET, now, body).unwrap();

        assert!(verifier.verify(&stripe_headers(now, &sig), body, now + 10).is_ok());
        assert!(matches!(
            verifier.verify(&stripe_headers(now, &sig), br#"{"id":"evt_2"}"#, now),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            verifier.verify(&stripe_headers(now, &sig), body, now + 301),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            verifier.verify(&HeaderMap::new(), body, now),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn accepts_generic_timestamp_and_signature_headers() {
        let verifier = WebhookVerifier::new(Some(SECRET.into()), 300);
        let body = b"{}";
        let now = 1_700_000_000;
        let sig = sign_payload(SECRET, now, body).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&now.to_string()).unwrap());
        headers.insert(
            "x-signature",
            HeaderValue::from_str(&format!("sha256={sig}")).unwrap(),
        );
        assert!(verifier.verify(&headers, body, now).is_ok());
    }

    #[test]
    fn event_ids_resolve_for_charges_and_intents() {
        let charge: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "charge.succeeded",
            "data": {"object": {"id": "ch_1", "payment_intent": "pi_1"}}
        }))
        .unwrap();
        assert_eq!(charge.intent_id(), Some("pi_1"));
        assert_eq!(charge.charge_id(), Some("ch_1"));

        let intent: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_2",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_2", "latest_charge": "ch_2"}}
        }))
        .unwrap();
        assert_eq!(intent.intent_id(), Some("pi_2"));
        assert_eq!(intent.charge_id(), Some("ch_2"));
    }

    #[tokio::test]
    async fn stripe_gateway_creates_and_retrieves_intents() {
        use wiremock::matchers::{body_string_contains, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("amount=23000"))
            .and(body_string_contains("currency=usd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "client_secret": "pi_123_secret_abc",
                "status": "requires_payment_method"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "status": "succeeded",
                "amount": 23000,
                "latest_charge": "ch_9"
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(format!("{}/", server.uri()), "sk_test_123").unwrap();
        let metadata = HashMap::from([("product_name".to_string(), "8ft Pod".to_string())]);
        let created = gateway.create_intent(23_000, "usd", metadata).await.unwrap();
        assert_eq!(created.id, "pi_123");
        assert_eq!(created.client_secret, "pi_123_secret_abc");

        let verified = gateway.retrieve_intent("pi_123").await.unwrap();
        assert!(verified.status.is_succeeded());
        assert_eq!(verified.latest_charge.as_deref(), Some("ch_9"));
    }

    #[tokio::test]
    async fn stripe_errors_become_gateway_errors() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "message": "No such payment_intent" }
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(server.uri(), "sk_test_123").unwrap();
        let result = gateway.retrieve_intent("pi_missing").await;
        assert!(matches!(result, Err(ServiceError::GatewayError(_))));

        let result = UnconfiguredGateway.retrieve_intent("pi_any").await;
        assert!(matches!(result, Err(ServiceError::GatewayError(_))));
    }

    #[test]
    fn unknown_intent_status_deserializes() {
        let status: IntentStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(status, IntentStatus::Unknown);
        let status: IntentStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert!(status.is_succeeded());
    }
}
