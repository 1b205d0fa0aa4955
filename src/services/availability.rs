use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::{
        blackout_date::{self, Entity as BlackoutDate},
        booking::{self, BookingStatus, Entity as Booking},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
};

/// Earliest drop-off date a customer may pick on `today`.
pub fn min_bookable_date(today: NaiveDate) -> NaiveDate {
    today + Duration::days(1)
}

fn inventory_holding_statuses() -> [BookingStatus; 2] {
    [BookingStatus::Confirmed, BookingStatus::InProgress]
}

/// Bookings whose unit is out on `date`: dropped off on or before it and
/// not yet picked up (or with no pickup date at all).
pub(crate) fn occupying_on(date: NaiveDate) -> Condition {
    Condition::all()
        .add(booking::Column::Status.is_in(inventory_holding_statuses()))
        .add(booking::Column::DropOffDate.lte(date))
        .add(
            Condition::any()
                .add(booking::Column::PickupDate.gte(date))
                .add(booking::Column::PickupDate.is_null()),
        )
}

fn applies_to(product_id: i32) -> Condition {
    Condition::any()
        .add(blackout_date::Column::ProductId.is_null())
        .add(blackout_date::Column::ProductId.eq(product_id))
}

/// Units of `product` left on `date`, never negative.
pub async fn available_units<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
    date: NaiveDate,
) -> Result<i64, ServiceError> {
    let out = Booking::find()
        .filter(booking::Column::ProductId.eq(product.id))
        .filter(occupying_on(date))
        .count(conn)
        .await?;

    let remaining = i64::from(product.stock_quantity) - out as i64;
    Ok(remaining.max(0))
}

/// True when a global or product-specific blackout falls on `date`.
pub async fn is_blocked<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    date: NaiveDate,
) -> Result<bool, ServiceError> {
    let hits = BlackoutDate::find()
        .filter(blackout_date::Column::Date.eq(date))
        .filter(applies_to(product_id))
        .count(conn)
        .await?;
    Ok(hits > 0)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateBlackoutRequest {
    pub date: NaiveDate,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub reason: String,
    pub product_id: Option<i32>,
}

#[derive(Clone)]
pub struct AvailabilityService {
    db: Arc<DatabaseConnection>,
}

impl AvailabilityService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn available_units(
        &self,
        product: &product::Model,
        date: NaiveDate,
    ) -> Result<i64, ServiceError> {
        available_units(&*self.db, product, date).await
    }

    pub async fn is_blocked(&self, product_id: i32, date: NaiveDate) -> Result<bool, ServiceError> {
        is_blocked(&*self.db, product_id, date).await
    }

    /// Blackouts from `from` onwards that affect `product_id`, for the date picker.
    pub async fn blackout_dates_for(
        &self,
        product_id: i32,
        from: NaiveDate,
    ) -> Result<Vec<NaiveDate>, ServiceError> {
        let rows = BlackoutDate::find()
            .filter(blackout_date::Column::Date.gte(from))
            .filter(applies_to(product_id))
            .order_by_asc(blackout_date::Column::Date)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|b| b.date).collect())
    }

    pub async fn upcoming_blackouts(
        &self,
        from: NaiveDate,
        limit: u64,
    ) -> Result<Vec<blackout_date::Model>, ServiceError> {
        Ok(BlackoutDate::find()
            .filter(blackout_date::Column::Date.gte(from))
            .order_by_asc(blackout_date::Column::Date)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Every blackout, newest date first.
    pub async fn list_blackouts(&self) -> Result<Vec<blackout_date::Model>, ServiceError> {
        Ok(BlackoutDate::find()
            .order_by_desc(blackout_date::Column::Date)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn create_blackout(
        &self,
        request: CreateBlackoutRequest,
    ) -> Result<blackout_date::Model, ServiceError> {
        request.validate()?;

        if let Some(product_id) = request.product_id {
            Product::find_by_id(product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))?;
        }

        // NULL product ids never collide in a unique index
        let scope = match request.product_id {
            Some(product_id) => blackout_date::Column::ProductId.eq(product_id),
            None => blackout_date::Column::ProductId.is_null(),
        };
        let duplicates = BlackoutDate::find()
            .filter(blackout_date::Column::Date.eq(request.date))
            .filter(scope)
            .count(&*self.db)
            .await?;
        if duplicates > 0 {
            return Err(ServiceError::Conflict(format!(
                "a blackout already exists on {}",
                request.date
            )));
        }

        let created = blackout_date::ActiveModel {
            date: Set(request.date),
            reason: Set(request.reason.trim().to_string()),
            product_id: Set(request.product_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
                "a blackout already exists on {}",
                request.date
            )),
            _ => ServiceError::DatabaseError(err),
        })?;

        info!(date = %created.date, product_id = ?created.product_id, "blackout date added");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn delete_blackout(&self, id: i32) -> Result<(), ServiceError> {
        let existing = BlackoutDate::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("blackout date {id}")))?;
        existing.delete(&*self.db).await?;
        info!(blackout_id = id, "blackout date removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tomorrow_is_the_first_bookable_day() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(
            min_bookable_date(today),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }
}
