use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    entities::{
        booking::{self, BookingStatus, Entity as Booking},
        product::{self, Entity as Product, ProductCategory},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Lowercase, hyphen-separated form of `name` suitable for URLs.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    if value.scale() > 2 {
        return Err(ValidationError::new("at_most_two_decimal_places"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub slug: Option<String>,
    pub category: ProductCategory,
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub size_description: String,
    #[validate(custom = "validate_money")]
    pub monthly_rate: Decimal,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<ProductCategory>,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub size_description: Option<String>,
    #[validate(custom = "validate_money")]
    pub monthly_rate: Option<Decimal>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Product row with the number of bookings currently holding a unit.
#[derive(Debug, Clone)]
pub struct InventoryLine {
    pub product: product::Model,
    pub active_rentals: u64,
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Bookable products in catalog order.
    pub async fn list_active(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Category)
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_active_by_slug(&self, slug: &str) -> Result<product::Model, ServiceError> {
        Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {slug}")))
    }

    pub async fn get(&self, id: i32) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product {id}")))
    }

    /// Every product with its confirmed or in-progress rental count.
    pub async fn inventory(&self) -> Result<Vec<InventoryLine>, ServiceError> {
        let products = Product::find()
            .order_by_asc(product::Column::Category)
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(products.len());
        for product in products {
            let active_rentals = Booking::find()
                .filter(booking::Column::ProductId.eq(product.id))
                .filter(
                    booking::Column::Status
                        .is_in([BookingStatus::Confirmed, BookingStatus::InProgress]),
                )
                .count(&*self.db)
                .await?;
            lines.push(InventoryLine {
                product,
                active_rentals,
            });
        }
        Ok(lines)
    }

    /// First free slug among `base`, `base-2`, `base-3`, …
    async fn unique_slug(&self, base: &str, exclude_id: Option<i32>) -> Result<String, ServiceError> {
        let base = if base.is_empty() { "product" } else { base };
        let mut candidate = base.to_string();
        let mut suffix = 2;

        loop {
            let mut query = Product::find().filter(product::Column::Slug.eq(candidate.as_str()));
            if let Some(id) = exclude_id {
                query = query.filter(product::Column::Id.ne(id));
            }
            if query.count(&*self.db).await? == 0 {
                return Ok(candidate);
            }
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<product::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let base = request
            .slug
            .as_deref()
            .map(slugify)
            .unwrap_or_else(|| slugify(&request.name));
        let slug = self.unique_slug(&base, None).await?;
        let now = Utc::now();

        let created = product::ActiveModel {
            name: Set(request.name.trim().to_string()),
            slug: Set(slug),
            category: Set(request.category),
            description: Set(request.description),
            size_description: Set(request.size_description),
            monthly_rate: Set(request.monthly_rate),
            image_url: Set(request.image_url),
            stock_quantity: Set(request.stock_quantity),
            is_active: Set(request.is_active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = created.id, slug = %created.slug, "product created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i32,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let existing = self.get(id).await?;
        let mut active: product::ActiveModel = existing.into();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(category) = request.category {
            active.category = Set(category);
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(size) = request.size_description {
            active.size_description = Set(size);
        }
        if let Some(rate) = request.monthly_rate {
            active.monthly_rate = Set(rate);
        }
        if let Some(url) = request.image_url {
            active.image_url = Set(Some(url).filter(|u| !u.is_empty()));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Sets the number of physical units owned.
    #[instrument(skip(self))]
    pub async fn update_stock(&self, id: i32, stock_quantity: i32) -> Result<product::Model, ServiceError> {
        if stock_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "stock_quantity must not be negative".into(),
            ));
        }

        let existing = self.get(id).await?;
        let old_quantity = existing.stock_quantity;
        let mut active: product::ActiveModel = existing.into();
        active.stock_quantity = Set(stock_quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(product_id = id, old_quantity, new_quantity = stock_quantity, "stock updated");
        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                product_id: id,
                old_quantity,
                new_quantity: stock_quantity,
            })
            .await;
        Ok(updated)
    }

    /// Deletes a product that no booking references.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let existing = self.get(id).await?;
        let referenced = Booking::find()
            .filter(booking::Column::ProductId.eq(id))
            .count(&*self.db)
            .await?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(format!(
                "{} has {referenced} booking(s); deactivate it instead",
                existing.name
            )));
        }
        existing.delete(&*self.db).await?;
        info!(product_id = id, "product deleted");
        Ok(())
    }
}
