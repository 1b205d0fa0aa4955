// Customer-facing booking flow
pub mod catalog;
pub mod checkout;
pub mod payment_webhooks;
pub mod pickup;

// Staff dashboard
pub mod blackouts;
pub mod dashboard;
pub mod inventory;
pub mod pricing;
pub mod staff_users;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    notifications::NotificationDispatcher,
    services::{
        availability::AvailabilityService,
        bookings::BookingService,
        checkout::CheckoutService,
        payments::{PaymentGateway, PaymentService, WebhookVerifier},
        pricing::PricingService,
        products::ProductService,
        staff::StaffService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: ProductService,
    pub availability: AvailabilityService,
    pub pricing: PricingService,
    pub bookings: BookingService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub staff: StaffService,
    pub notifier: NotificationDispatcher,
}

impl AppServices {
    /// Wires every service over one pool. Loads the pricing snapshot, so it touches the database.
    pub async fn build(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationDispatcher,
        redis_client: Option<Arc<redis::Client>>,
    ) -> Result<Self, ServiceError> {
        let pricing = PricingService::load(db_pool.clone(), event_sender.clone()).await?;
        let products = ProductService::new(db_pool.clone(), event_sender.clone());
        let availability = AvailabilityService::new(db_pool.clone());
        let bookings = BookingService::new(db_pool.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db_pool.clone(),
            gateway.clone(),
            pricing.clone(),
            bookings.clone(),
            config.checkout_draft_ttl(),
            config.default_currency.clone(),
        )
        .with_publishable_key(config.stripe_publishable_key.clone());
        let verifier = WebhookVerifier::new(
            config.payment_webhook_secret.clone(),
            config.payment_webhook_tolerance_secs.unwrap_or(300),
        );
        let payments = PaymentService::new(
            db_pool.clone(),
            gateway,
            checkout.clone(),
            bookings.clone(),
            notifier.clone(),
            event_sender,
            verifier,
            redis_client,
        );
        let staff = StaffService::new(db_pool);

        Ok(Self {
            products,
            availability,
            pricing,
            bookings,
            checkout,
            payments,
            staff,
            notifier,
        })
    }
}

/// Calendar date used for "tomorrow or later" and dashboard windows.
pub(crate) fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}
