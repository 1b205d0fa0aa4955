use std::sync::{Arc, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    entities::{
        distance_fee::{self, Entity as DistanceFee},
        pricing_setting::{self, Entity as PricingSetting, SINGLETON_ID},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Used when distance pricing is on but no tier covers the origin.
pub const DEFAULT_TIER_FALLBACK_FEE: Decimal = dec!(250.00);

/// Point-in-time copy of the settings row and the active fee tiers.
#[derive(Debug, Clone)]
pub struct PricingSnapshot {
    pub settings: pricing_setting::Model,
    /// Active tiers, ascending by `min_distance_km`
    pub tiers: Vec<distance_fee::Model>,
}

impl PricingSnapshot {
    pub fn distance_pricing_active(&self) -> bool {
        self.settings.distance_pricing_enabled && !self.tiers.is_empty()
    }
}

/// Transport fee for a delivery `distance_km` away (or unknown).
pub fn resolve_transport_fee(snapshot: &PricingSnapshot, distance_km: Option<Decimal>) -> Decimal {
    if !snapshot.distance_pricing_active() {
        return snapshot.settings.transport_fee;
    }

    if let Some(distance) = distance_km {
        if let Some(tier) = snapshot.tiers.iter().find(|t| t.covers(distance)) {
            return tier.fee;
        }
    }

    snapshot
        .tiers
        .iter()
        .find(|t| t.covers(Decimal::ZERO))
        .map(|t| t.fee)
        .unwrap_or(DEFAULT_TIER_FALLBACK_FEE)
}

fn default_settings() -> pricing_setting::Model {
    pricing_setting::Model {
        id: SINGLETON_ID,
        transport_fee: dec!(80.00),
        delivery_fee: dec!(79.00),
        pickup_fee: dec!(79.00),
        distance_pricing_enabled: false,
        updated_by: None,
        updated_at: Utc::now(),
    }
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePricingRequest {
    #[validate(custom = "validate_non_negative")]
    pub transport_fee: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub delivery_fee: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub pickup_fee: Decimal,
    pub distance_pricing_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct FeeTierRequest {
    #[validate(custom = "validate_non_negative")]
    pub min_distance_km: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub max_distance_km: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub fee: Decimal,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl FeeTierRequest {
    fn check_band(&self) -> Result<(), ServiceError> {
        if self.min_distance_km > self.max_distance_km {
            return Err(ServiceError::ValidationError(
                "min_distance_km must not exceed max_distance_km".to_string(),
            ));
        }
        Ok(())
    }
}

fn duplicate_band(err: sea_orm::DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict("a fee tier with this distance band already exists".to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

/// Owns the pricing settings and keeps an in-memory snapshot that is
/// refreshed after every staff update.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
    snapshot: Arc<RwLock<PricingSnapshot>>,
    event_sender: EventSender,
}

impl PricingService {
    /// Loads the settings row, writing defaults once if it is missing.
    #[instrument(skip(db, event_sender))]
    pub async fn load(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
    ) -> Result<Self, ServiceError> {
        let snapshot = Self::read_snapshot(&db).await?;
        Ok(Self {
            db,
            snapshot: Arc::new(RwLock::new(snapshot)),
            event_sender,
        })
    }

    async fn read_snapshot(db: &DatabaseConnection) -> Result<PricingSnapshot, ServiceError> {
        let settings = match PricingSetting::find_by_id(SINGLETON_ID).one(db).await? {
            Some(settings) => settings,
            None => {
                warn!("pricing settings row missing, writing defaults");
                let defaults = default_settings();
                let active = pricing_setting::ActiveModel {
                    id: Set(defaults.id),
                    transport_fee: Set(defaults.transport_fee),
                    delivery_fee: Set(defaults.delivery_fee),
                    pickup_fee: Set(defaults.pickup_fee),
                    distance_pricing_enabled: Set(defaults.distance_pricing_enabled),
                    updated_by: Set(None),
                    updated_at: Set(defaults.updated_at),
                };
                PricingSetting::insert(active)
                    .on_conflict(
                        OnConflict::column(pricing_setting::Column::Id)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await?;
                PricingSetting::find_by_id(SINGLETON_ID)
                    .one(db)
                    .await?
                    .unwrap_or(defaults)
            }
        };

        let tiers = DistanceFee::find()
            .filter(distance_fee::Column::IsActive.eq(true))
            .order_by_asc(distance_fee::Column::MinDistanceKm)
            .order_by_asc(distance_fee::Column::Id)
            .all(db)
            .await?;

        Ok(PricingSnapshot { settings, tiers })
    }

    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let fresh = Self::read_snapshot(&self.db).await?;
        match self.snapshot.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PricingSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn settings(&self) -> pricing_setting::Model {
        self.snapshot().settings
    }

    pub fn transport_fee(&self, distance_km: Option<Decimal>) -> Decimal {
        resolve_transport_fee(&self.snapshot(), distance_km)
    }

    pub fn pickup_fee(&self) -> Decimal {
        self.snapshot().settings.pickup_fee
    }

    #[instrument(skip(self))]
    pub async fn update_settings(
        &self,
        request: UpdatePricingRequest,
        updated_by: Option<String>,
    ) -> Result<pricing_setting::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let current = PricingSetting::find_by_id(SINGLETON_ID)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("pricing settings".to_string()))?;

        let mut active: pricing_setting::ActiveModel = current.into();
        active.transport_fee = Set(request.transport_fee);
        active.delivery_fee = Set(request.delivery_fee);
        active.pickup_fee = Set(request.pickup_fee);
        active.distance_pricing_enabled = Set(request.distance_pricing_enabled);
        active.updated_by = Set(updated_by.clone());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.refresh().await?;
        info!(transport_fee = %updated.transport_fee, distance_pricing = updated.distance_pricing_enabled, "pricing settings updated");
        self.event_sender
            .send_or_log(Event::PricingUpdated { updated_by })
            .await;

        Ok(updated)
    }

    /// All tiers, including inactive ones.
    pub async fn list_tiers(&self) -> Result<Vec<distance_fee::Model>, ServiceError> {
        Ok(DistanceFee::find()
            .order_by_asc(distance_fee::Column::MinDistanceKm)
            .order_by_asc(distance_fee::Column::Id)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn create_tier(
        &self,
        request: FeeTierRequest,
    ) -> Result<distance_fee::Model, ServiceError> {
        request.validate()?;
        request.check_band()?;

        let tier = distance_fee::ActiveModel {
            min_distance_km: Set(request.min_distance_km),
            max_distance_km: Set(request.max_distance_km),
            fee: Set(request.fee),
            is_active: Set(request.is_active),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(duplicate_band)?;

        self.refresh().await?;
        info!(tier_id = tier.id, fee = %tier.fee, "fee tier created");
        Ok(tier)
    }

    #[instrument(skip(self))]
    pub async fn update_tier(
        &self,
        id: i32,
        request: FeeTierRequest,
    ) -> Result<distance_fee::Model, ServiceError> {
        request.validate()?;
        request.check_band()?;

        let existing = DistanceFee::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("fee tier {id}")))?;

        let mut active: distance_fee::ActiveModel = existing.into();
        active.min_distance_km = Set(request.min_distance_km);
        active.max_distance_km = Set(request.max_distance_km);
        active.fee = Set(request.fee);
        active.is_active = Set(request.is_active);
        let tier = active.update(&*self.db).await.map_err(duplicate_band)?;

        self.refresh().await?;
        Ok(tier)
    }

    #[instrument(skip(self))]
    pub async fn delete_tier(&self, id: i32) -> Result<(), ServiceError> {
        let existing = DistanceFee::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("fee tier {id}")))?;
        existing.delete(&*self.db).await?;
        self.refresh().await?;
        info!(tier_id = id, "fee tier deleted");
        Ok(())
    }
}
