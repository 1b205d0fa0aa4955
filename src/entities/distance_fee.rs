use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transport fee tier for an inclusive distance band in kilometres.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "distance_fees")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub min_distance_km: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub max_distance_km: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub fee: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn covers(&self, distance_km: Decimal) -> bool {
        self.min_distance_km <= distance_km && distance_km <= self.max_distance_km
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
