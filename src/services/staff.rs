use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::staff_user::{self, Entity as StaffUser},
    errors::ServiceError,
};

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is unreadable");
            false
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateStaffRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[serde(default = "default_true")]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateStaffRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: Option<String>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_active: Option<bool>,
}

/// Dashboard accounts.
#[derive(Clone)]
pub struct StaffService {
    db: Arc<DatabaseConnection>,
}

impl StaffService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Active staff account matching the credentials.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<staff_user::Model, ServiceError> {
        let user = StaffUser::find()
            .filter(staff_user::Column::Username.eq(username.trim()))
            .one(&*self.db)
            .await?;

        match user {
            Some(user) if user.is_active && user.is_staff && verify_password(password, &user.password_hash) => {
                Ok(user)
            }
            _ => Err(ServiceError::Unauthorized("invalid username or password".into())),
        }
    }

    pub async fn get(&self, id: i32) -> Result<staff_user::Model, ServiceError> {
        StaffUser::find_by_id(id)
            .filter(staff_user::Column::IsStaff.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("staff user {id}")))
    }

    pub async fn list(&self) -> Result<Vec<staff_user::Model>, ServiceError> {
        Ok(StaffUser::find()
            .filter(staff_user::Column::IsStaff.eq(true))
            .order_by_asc(staff_user::Column::Username)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create(&self, request: CreateStaffRequest) -> Result<staff_user::Model, ServiceError> {
        request.validate()?;
        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();

        let user = staff_user::ActiveModel {
            username: Set(request.username.trim().to_string()),
            email: Set(request.email.trim().to_string()),
            password_hash: Set(password_hash),
            is_staff: Set(request.is_staff),
            is_superuser: Set(request.is_superuser),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict(format!("username {} is taken", request.username.trim()))
            }
            _ => ServiceError::DatabaseError(err),
        })?;

        info!(user_id = user.id, superuser = user.is_superuser, "staff user created");
        Ok(user)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i32,
        request: UpdateStaffRequest,
    ) -> Result<staff_user::Model, ServiceError> {
        request.validate()?;
        let existing = self.get(id).await?;
        let mut active: staff_user::ActiveModel = existing.into();

        if let Some(email) = request.email {
            active.email = Set(email.trim().to_string());
        }
        if let Some(password) = request.password {
            active.password_hash = Set(hash_password(&password)?);
        }
        if let Some(is_staff) = request.is_staff {
            active.is_staff = Set(is_staff);
        }
        if let Some(is_superuser) = request.is_superuser {
            active.is_superuser = Set(is_superuser);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32, acting_user_id: i32) -> Result<(), ServiceError> {
        if id == acting_user_id {
            return Err(ServiceError::Conflict("you cannot delete your own account".into()));
        }
        let existing = self.get(id).await?;
        existing.delete(&*self.db).await?;
        info!(user_id = id, "staff user deleted");
        Ok(())
    }
}
