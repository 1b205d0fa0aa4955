#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Days, NaiveDate, Utc};
use rental_booking_api::{
    app_router,
    auth::{AuthConfig, AuthService},
    circuit_breaker::CircuitBreakerConfig,
    config::AppConfig,
    db,
    entities::{
        booking::{self, BookingStatus, PaymentStatus},
        product::{self, ProductCategory},
        staff_user,
    },
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    notifications::{NotificationDispatcher, NotificationError, NotificationJob, NotificationSender},
    services::{
        payments::{CreatedIntent, IntentStatus, PaymentGateway, VerifiedIntent},
        products::CreateProductRequest,
        staff::CreateStaffRequest,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "k3Jd9vQ2mXz7LpR4tWb8NcY6hFs1GaE5uKo0iVj3qZx9rTn2wMy7pLc4dBh8fSg6";

/// Payment provider double. Intents start unpaid until [`FakeGateway::complete`] is called.
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<HashMap<String, VerifiedIntent>>,
    next_id: AtomicUsize,
}

impl FakeGateway {
    pub fn complete(&self, intent_id: &str) {
        self.set_status(intent_id, IntentStatus::Succeeded);
    }

    /// Succeeded, but the charge id only arrives later by webhook.
    pub fn complete_without_charge(&self, intent_id: &str) {
        self.set_status(intent_id, IntentStatus::Succeeded);
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.latest_charge = None;
        }
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        let mut intents = self.intents.lock().unwrap();
        let intent = intents.get_mut(intent_id).expect("intent was created");
        if status.is_succeeded() {
            intent.latest_charge = Some(format!("ch_{intent_id}"));
        }
        intent.status = status;
    }

    /// Provider-side amount edit, as if the intent were updated outside checkout.
    pub fn set_amount(&self, intent_id: &str, amount_cents: i64) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.amount = amount_cents;
        }
    }

    pub fn amount_of(&self, intent_id: &str) -> i64 {
        self.intents.lock().unwrap()[intent_id].amount
    }

    pub fn created(&self) -> usize {
        self.intents.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_cents: i64,
        _currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CreatedIntent, ServiceError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_test_{n}");
        self.intents.lock().unwrap().insert(
            id.clone(),
            VerifiedIntent {
                id: id.clone(),
                status: IntentStatus::RequiresPaymentMethod,
                amount: amount_cents,
                latest_charge: None,
                metadata,
            },
        );
        Ok(CreatedIntent {
            client_secret: format!("{id}_secret"),
            id,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<VerifiedIntent, ServiceError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| ServiceError::GatewayError(format!("no such intent {intent_id}")))
    }
}

/// Collects every notification job handed to it.
#[derive(Default)]
pub struct RecordingSender {
    jobs: Mutex<Vec<NotificationJob>>,
}

impl RecordingSender {
    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        self.jobs.lock().unwrap().push(*job);
        Ok(())
    }
}

/// Full router over a throwaway SQLite file, with fake payments and notifications.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub notifications: Arc<RecordingSender>,
    pub auth_service: Arc<AuthService>,
    superuser_token: String,
    staff_token: String,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::new_with(|_| {}).await
    }

    pub async fn new_with(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let db_path = db_dir.path().join("rentals_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "redis://127.0.0.1:6379".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.scheduler_enabled = false;
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("sqlite connection");
        db::run_migrations(&pool).await.expect("migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let notifications = Arc::new(RecordingSender::default());
        let notifier = NotificationDispatcher::new(
            notifications.clone(),
            notifications.clone(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
        );

        let services = AppServices::build(
            db_arc.clone(),
            &cfg,
            EventSender::new(event_tx),
            gateway.clone(),
            notifier,
            None,
        )
        .await
        .expect("services");

        let auth_service = Arc::new(AuthService::new(
            AuthConfig::new(
                cfg.jwt_secret.clone(),
                cfg.auth_audience.clone(),
                cfg.auth_issuer.clone(),
                Duration::from_secs(cfg.jwt_expiration as u64),
            ),
            services.staff.clone(),
        ));

        let admin = create_staff(&services, "admin", true).await;
        let ops = create_staff(&services, "ops", false).await;
        let superuser_token = auth_service
            .generate_token(&admin)
            .expect("admin token")
            .access_token;
        let staff_token = auth_service
            .generate_token(&ops)
            .expect("staff token")
            .access_token;

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            redis: None,
        };
        let router = app_router(state.clone(), auth_service.clone());

        Self {
            router,
            state,
            gateway,
            notifications,
            auth_service,
            superuser_token,
            staff_token,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub fn superuser_token(&self) -> &str {
        &self.superuser_token
    }

    pub fn staff_token(&self) -> &str {
        &self.staff_token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).expect("request")).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn request_as_staff(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let token = self.staff_token.clone();
        self.request(method, uri, body, Some(&token)).await
    }

    pub async fn request_as_superuser(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.superuser_token.clone();
        self.request(method, uri, body, Some(&token)).await
    }

    pub async fn seed_product(
        &self,
        name: &str,
        category: ProductCategory,
        monthly_rate: Decimal,
        stock_quantity: i32,
    ) -> product::Model {
        self.state
            .services
            .products
            .create(CreateProductRequest {
                name: name.to_string(),
                slug: None,
                category,
                description: format!("{name} for rent"),
                size_description: String::new(),
                monthly_rate,
                image_url: None,
                stock_quantity,
                is_active: true,
            })
            .await
            .expect("seed product")
    }

    /// Opens a draft for `slug` and fills in the customer details. Returns the token.
    pub async fn start_checkout(&self, slug: &str, drop_off: NaiveDate, months: i32, email: &str) -> String {
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/booking/products/{slug}/dates"),
                Some(json!({ "drop_off_date": drop_off, "rental_months": months })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "select dates");
        let token = response_json(response).await["data"]["token"]
            .as_str()
            .expect("draft token")
            .to_string();

        let response = self
            .request(
                Method::PUT,
                &format!("/api/v1/booking/drafts/{token}/customer"),
                Some(customer_json(email)),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "customer details");
        token
    }

    /// Runs the whole checkout with a successful payment and returns the public booking id.
    pub async fn book(&self, slug: &str, drop_off: NaiveDate, months: i32, email: &str) -> Uuid {
        let token = self.start_checkout(slug, drop_off, months, email).await;

        let summary = response_json(
            self.request(
                Method::POST,
                &format!("/api/v1/booking/drafts/{token}/summary"),
                None,
                None,
            )
            .await,
        )
        .await;
        let intent_id = summary["data"]["payment_intent_id"]
            .as_str()
            .expect("intent id")
            .to_string();
        self.gateway.complete(&intent_id);

        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/booking/drafts/{token}/payment"),
                Some(json!({ "payment_intent_id": intent_id })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "confirm payment");
        let outcome = response_json(response).await;
        outcome["data"]["booking_id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("booking id")
    }
}

impl TestApp {
    /// Writes a confirmed booking straight to the database, bypassing checkout.
    pub async fn insert_booking(
        &self,
        product: &product::Model,
        drop_off: NaiveDate,
        pickup: Option<NaiveDate>,
        status: BookingStatus,
    ) -> booking::Model {
        let now = Utc::now();
        booking::ActiveModel {
            booking_id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            customer_name: Set("Sam Ortiz".to_string()),
            customer_email: Set("sam@example.com".to_string()),
            customer_phone: Set("5550001111".to_string()),
            delivery_address: Set("9 Elm Street".to_string()),
            delivery_city: Set("Salem".to_string()),
            delivery_state: Set("OR".to_string()),
            delivery_zip: Set("97301".to_string()),
            delivery_notes: Set(String::new()),
            drop_off_date: Set(drop_off),
            pickup_date: Set(pickup),
            rental_months: Set(1),
            monthly_rate: Set(product.monthly_rate),
            transport_fee: Set(Decimal::new(8000, 2)),
            total_amount: Set(product.monthly_rate + Decimal::new(8000, 2)),
            stripe_payment_intent_id: Set(Some(format!("pi_seed_{}", Uuid::new_v4().simple()))),
            stripe_charge_id: Set(None),
            payment_status: Set(PaymentStatus::Paid),
            status: Set(status),
            confirmation_email_sent: Set(false),
            confirmation_sms_sent: Set(false),
            drop_off_reminder_sent: Set(false),
            pickup_reminder_sent: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            confirmed_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed booking")
    }

    pub async fn find_booking(&self, booking_id: Uuid) -> booking::Model {
        self.state
            .services
            .bookings
            .find_by_public_id(booking_id)
            .await
            .expect("booking exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

async fn create_staff(services: &AppServices, username: &str, superuser: bool) -> staff_user::Model {
    services
        .staff
        .create(CreateStaffRequest {
            username: username.to_string(),
            email: format!("{username}@rentals.test"),
            password: "correct-horse-battery".to_string(),
            is_staff: true,
            is_superuser: superuser,
        })
        .await
        .expect("staff user")
}

pub fn customer_json(email: &str) -> Value {
    json!({
        "customer_name": "Jordan Reyes",
        "customer_email": email,
        "customer_phone": "(555) 201-3344",
        "delivery_address": "42 Harbor Lane",
        "delivery_city": "Portland",
        "delivery_state": "OR",
        "delivery_zip": "97201",
        "delivery_notes": "Side gate"
    })
}

pub fn days_from_today(days: u64) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_add_days(Days::new(days))
        .expect("date in range")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
