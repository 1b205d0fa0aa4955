use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_products_table::Migration),
            Box::new(m20240601_000002_create_pricing_tables::Migration),
            Box::new(m20240601_000003_create_blackout_dates_table::Migration),
            Box::new(m20240601_000004_create_bookings_table::Migration),
            Box::new(m20240601_000005_create_pickup_requests_table::Migration),
            Box::new(m20240601_000006_create_checkout_drafts_table::Migration),
            Box::new(m20240601_000007_create_staff_users_table::Migration),
        ]
    }
}

mod m20240601_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string_len(200).not_null())
                        .col(
                            ColumnDef::new(Products::Slug)
                                .string_len(220)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Category).string_len(20).not_null())
                        .col(ColumnDef::new(Products::Description).text().not_null())
                        .col(
                            ColumnDef::new(Products::SizeDescription)
                                .string_len(100)
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(Products::MonthlyRate)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category_name")
                        .table(Products::Table)
                        .col(Products::Category)
                        .col(Products::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Slug,
        Category,
        Description,
        SizeDescription,
        MonthlyRate,
        ImageUrl,
        StockQuantity,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_pricing_tables {

    use rust_decimal_macros::dec;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_pricing_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PricingSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PricingSettings::Id)
                                .integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PricingSettings::TransportFee)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PricingSettings::DeliveryFee)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PricingSettings::PickupFee)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PricingSettings::DistancePricingEnabled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PricingSettings::UpdatedBy)
                                .string_len(100)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PricingSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Seed the singleton settings row
            let seed = Query::insert()
                .into_table(PricingSettings::Table)
                .columns([
                    PricingSettings::Id,
                    PricingSettings::TransportFee,
                    PricingSettings::DeliveryFee,
                    PricingSettings::PickupFee,
                    PricingSettings::DistancePricingEnabled,
                    PricingSettings::UpdatedAt,
                ])
                .values([
                    1i32.into(),
                    dec!(80.00).into(),
                    dec!(79.00).into(),
                    dec!(79.00).into(),
                    false.into(),
                    chrono::Utc::now().into(),
                ])
                .map_err(|e| DbErr::Migration(e.to_string()))?
                .on_conflict(
                    OnConflict::column(PricingSettings::Id)
                        .do_nothing()
                        .to_owned(),
                )
                .to_owned();
            manager.exec_stmt(seed).await?;

            manager
                .create_table(
                    Table::create()
                        .table(DistanceFees::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DistanceFees::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DistanceFees::MinDistanceKm)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DistanceFees::MaxDistanceKm)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DistanceFees::Fee)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DistanceFees::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(DistanceFees::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_distance_fees_band")
                        .table(DistanceFees::Table)
                        .col(DistanceFees::MinDistanceKm)
                        .col(DistanceFees::MaxDistanceKm)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DistanceFees::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PricingSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PricingSettings {
        Table,
        Id,
        TransportFee,
        DeliveryFee,
        PickupFee,
        DistancePricingEnabled,
        UpdatedBy,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DistanceFees {
        Table,
        Id,
        MinDistanceKm,
        MaxDistanceKm,
        Fee,
        IsActive,
        CreatedAt,
    }
}

mod m20240601_000003_create_blackout_dates_table {

    use super::m20240601_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_blackout_dates_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BlackoutDates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BlackoutDates::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(BlackoutDates::Date)
                                .date()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(BlackoutDates::Reason)
                                .string_len(200)
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(BlackoutDates::ProductId).integer().null())
                        .col(
                            ColumnDef::new(BlackoutDates::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_blackout_dates_product_id")
                                .from(BlackoutDates::Table, BlackoutDates::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BlackoutDates::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BlackoutDates {
        Table,
        Id,
        Date,
        Reason,
        ProductId,
        CreatedAt,
    }
}

mod m20240601_000004_create_bookings_table {

    use super::m20240601_000001_create_products_table::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_bookings_table"
        }
    }

    fn flag(col: Bookings) -> ColumnDef {
        ColumnDef::new(col)
            .boolean()
            .not_null()
            .default(false)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Bookings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Bookings::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Bookings::BookingId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Bookings::ProductId).integer().not_null())
                        .col(
                            ColumnDef::new(Bookings::CustomerName)
                                .string_len(200)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::CustomerEmail)
                                .string_len(254)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::CustomerPhone)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::DeliveryAddress).text().not_null())
                        .col(
                            ColumnDef::new(Bookings::DeliveryCity)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::DeliveryState)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::DeliveryZip)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::DeliveryNotes)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Bookings::DropOffDate).date().not_null())
                        .col(ColumnDef::new(Bookings::PickupDate).date().null())
                        .col(
                            ColumnDef::new(Bookings::RentalMonths)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Bookings::MonthlyRate)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::TransportFee)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::TotalAmount)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::StripePaymentIntentId)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::StripeChargeId)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::PaymentStatus)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(Bookings::Status)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(flag(Bookings::ConfirmationEmailSent))
                        .col(flag(Bookings::ConfirmationSmsSent))
                        .col(flag(Bookings::DropOffReminderSent))
                        .col(flag(Bookings::PickupReminderSent))
                        .col(
                            ColumnDef::new(Bookings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bookings_product_id")
                                .from(Bookings::Table, Bookings::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_status_drop_off")
                        .table(Bookings::Table)
                        .col(Bookings::Status)
                        .col(Bookings::DropOffDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_customer_email")
                        .table(Bookings::Table)
                        .col(Bookings::CustomerEmail)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_payment_intent")
                        .table(Bookings::Table)
                        .col(Bookings::StripePaymentIntentId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bookings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Bookings {
        Table,
        Id,
        BookingId,
        ProductId,
        CustomerName,
        CustomerEmail,
        CustomerPhone,
        DeliveryAddress,
        DeliveryCity,
        DeliveryState,
        DeliveryZip,
        DeliveryNotes,
        DropOffDate,
        PickupDate,
        RentalMonths,
        MonthlyRate,
        TransportFee,
        TotalAmount,
        StripePaymentIntentId,
        StripeChargeId,
        PaymentStatus,
        Status,
        ConfirmationEmailSent,
        ConfirmationSmsSent,
        DropOffReminderSent,
        PickupReminderSent,
        CreatedAt,
        UpdatedAt,
        ConfirmedAt,
    }
}

mod m20240601_000005_create_pickup_requests_table {

    use super::m20240601_000004_create_bookings_table::Bookings;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_pickup_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PickupRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PickupRequests::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::BookingId)
                                .integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::RequestedPickupDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PickupRequests::PickupAddress).text().null())
                        .col(
                            ColumnDef::new(PickupRequests::PickupNotes)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::StripePaymentIntentId)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::PaymentStatus)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::PickupEmailSent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::PickupSmsSent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickupRequests::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pickup_requests_booking_id")
                                .from(PickupRequests::Table, PickupRequests::BookingId)
                                .to(Bookings::Table, Bookings::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PickupRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PickupRequests {
        Table,
        Id,
        BookingId,
        RequestedPickupDate,
        PickupAddress,
        PickupNotes,
        StripePaymentIntentId,
        PaymentStatus,
        PickupEmailSent,
        PickupSmsSent,
        CreatedAt,
        ConfirmedAt,
    }
}

mod m20240601_000006_create_checkout_drafts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_checkout_drafts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CheckoutDrafts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CheckoutDrafts::Token)
                                .string_len(64)
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CheckoutDrafts::Kind)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutDrafts::Data)
                                .json_binary()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutDrafts::PaymentIntentId)
                                .string_len(200)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutDrafts::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutDrafts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CheckoutDrafts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_checkout_drafts_expires_at")
                        .table(CheckoutDrafts::Table)
                        .col(CheckoutDrafts::ExpiresAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CheckoutDrafts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CheckoutDrafts {
        Table,
        Token,
        Kind,
        Data,
        PaymentIntentId,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000007_create_staff_users_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000007_create_staff_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StaffUsers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StaffUsers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StaffUsers::Username)
                                .string_len(150)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(StaffUsers::Email)
                                .string_len(254)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StaffUsers::PasswordHash).string().not_null())
                        .col(
                            ColumnDef::new(StaffUsers::IsStaff)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StaffUsers::IsSuperuser)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(StaffUsers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(StaffUsers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StaffUsers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StaffUsers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StaffUsers {
        Table,
        Id,
        Username,
        Email,
        PasswordHash,
        IsStaff,
        IsSuperuser,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}
