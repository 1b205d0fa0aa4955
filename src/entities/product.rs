use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Rentable product line; stock is the number of physical units owned.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub category: ProductCategory,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub size_description: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub monthly_rate: Decimal,
    pub image_url: Option<String>,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    #[sea_orm(string_value = "storage_pod")]
    StoragePod,
    #[sea_orm(string_value = "garbage_bin")]
    GarbageBin,
}

impl ProductCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ProductCategory::StoragePod => "Storage Pod",
            ProductCategory::GarbageBin => "Garbage Bin",
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
    #[sea_orm(has_many = "super::blackout_date::Entity")]
    BlackoutDates,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::blackout_date::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BlackoutDates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
