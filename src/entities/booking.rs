use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A confirmed rental. `booking_id` is the only identifier exposed to customers.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub booking_id: Uuid,
    pub product_id: i32,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,

    #[sea_orm(column_type = "Text")]
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_state: String,
    pub delivery_zip: String,
    #[sea_orm(column_type = "Text")]
    pub delivery_notes: String,

    pub drop_off_date: NaiveDate,
    pub pickup_date: Option<NaiveDate>,
    pub rental_months: i32,

    /// Snapshots taken at booking time; later price changes never touch them.
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub monthly_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub transport_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,

    pub stripe_payment_intent_id: Option<String>,
    pub stripe_charge_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,

    pub confirmation_email_sent: bool,
    pub confirmation_sms_sent: bool,
    pub drop_off_reminder_sent: bool,
    pub pickup_reminder_sent: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Whether the unit is physically out with the customer on `date`.
    /// A missing pickup date means the unit has not come back yet.
    pub fn occupies(&self, date: NaiveDate) -> bool {
        self.status.holds_inventory()
            && self.drop_off_date <= date
            && self.pickup_date.map_or(true, |pickup| pickup >= date)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "pickup_scheduled")]
    PickupScheduled,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl BookingStatus {
    /// Legal lifecycle moves. Re-applying the current status is always allowed.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, PickupScheduled)
                | (Confirmed, Cancelled)
                | (InProgress, PickupScheduled)
                | (InProgress, Cancelled)
                | (PickupScheduled, Completed)
                | (PickupScheduled, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses that count against stock in availability checks.
    pub fn holds_inventory(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::InProgress)
    }

    /// Statuses from which a customer may schedule a pickup.
    pub fn allows_pickup(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::InProgress)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Restrict"
    )]
    Product,
    #[sea_orm(has_one = "super::pickup_request::Entity")]
    PickupRequest,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::pickup_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PickupRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
