use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240401_000001_create_catalog_tables::Migration),
            Box::new(m20240401_000002_create_order_tables::Migration),
            Box::new(m20240401_000003_create_wallet_tables::Migration),
            Box::new(m20240401_000004_create_push_tokens_table::Migration),
        ]
    }
}

mod m20240401_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000001_create_catalog_tables"
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
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::ProducerId).uuid().not_null())
                        .col(ColumnDef::new(Products::Title).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::Inventory)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::UnitLabel)
                                .string()
                                .not_null()
                                .default("piece"),
                        )
                        .col(
                            ColumnDef::new(Products::UnitSize)
                                .float()
                                .not_null()
                                .default(1.0),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_producer_id")
                        .table(Products::Table)
                        .col(Products::ProducerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Carts::BuyerId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Carts::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Carts::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(CartItems::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(CartItems::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(CartItems::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_cart_id")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Addresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Addresses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Addresses::BuyerId).uuid().not_null())
                        .col(ColumnDef::new(Addresses::Label).string().null())
                        .col(ColumnDef::new(Addresses::ContactName).string().not_null())
                        .col(ColumnDef::new(Addresses::ContactPhone).string().not_null())
                        .col(ColumnDef::new(Addresses::AddressLine1).string().not_null())
                        .col(ColumnDef::new(Addresses::AddressLine2).string().null())
                        .col(ColumnDef::new(Addresses::City).string().not_null())
                        .col(ColumnDef::new(Addresses::State).string().not_null())
                        .col(ColumnDef::new(Addresses::PostalCode).string().not_null())
                        .col(
                            ColumnDef::new(Addresses::Country)
                                .string()
                                .not_null()
                                .default("India"),
                        )
                        .col(
                            ColumnDef::new(Addresses::IsDefault)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Addresses::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Addresses::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_addresses_buyer_id")
                        .table(Addresses::Table)
                        .col(Addresses::BuyerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Addresses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        ProducerId,
        Title,
        Description,
        Price,
        Inventory,
        UnitLabel,
        UnitSize,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        BuyerId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Addresses {
        Table,
        Id,
        BuyerId,
        Label,
        ContactName,
        ContactPhone,
        AddressLine1,
        AddressLine2,
        City,
        State,
        PostalCode,
        Country,
        IsDefault,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240401_000002_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000002_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::BuyerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(ColumnDef::new(Orders::AddressId).uuid().not_null())
                        .col(ColumnDef::new(Orders::ProviderOrderRef).string().null())
                        .col(ColumnDef::new(Orders::ProviderPaymentRef).string().null())
                        .col(ColumnDef::new(Orders::ProviderSignature).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_buyer_id")
                        .table(Orders::Table)
                        .col(Orders::BuyerId)
                        .to_owned(),
                )
                .await?;

            // Duplicate prepaid verifications for the same provider payment
            // must not be able to create two orders.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_provider_payment_ref")
                        .table(Orders::Table)
                        .col(Orders::ProviderPaymentRef)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::FulfillmentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_product_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        BuyerId,
        TotalAmount,
        Currency,
        PaymentMethod,
        PaymentStatus,
        AddressId,
        ProviderOrderRef,
        ProviderPaymentRef,
        ProviderSignature,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        UnitPrice,
        FulfillmentStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240401_000003_create_wallet_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000003_create_wallet_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProducerWallets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProducerWallets::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProducerWallets::ProducerId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(ProducerWallets::Balance)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProducerWallets::Currency)
                                .string()
                                .not_null()
                                .default("INR"),
                        )
                        .col(
                            ColumnDef::new(ProducerWallets::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProducerWallets::UpdatedAt)
                                .timestamp()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WalletTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WalletTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::ProducerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::Direction)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::Currency)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::Description)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(WalletTransactions::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(WalletTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wallet_transactions_producer_id")
                        .table(WalletTransactions::Table)
                        .col(WalletTransactions::ProducerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AdminWallet::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AdminWallet::Id)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AdminWallet::Balance)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(AdminWallet::Currency)
                                .string()
                                .not_null()
                                .default("INR"),
                        )
                        .col(
                            ColumnDef::new(AdminWallet::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AdminWallet::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AdminWallet::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(WalletTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProducerWallets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProducerWallets {
        Table,
        Id,
        ProducerId,
        Balance,
        Currency,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WalletTransactions {
        Table,
        Id,
        ProducerId,
        Direction,
        Amount,
        Currency,
        Description,
        OrderId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum AdminWallet {
        Table,
        Id,
        Balance,
        Currency,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240401_000004_create_push_tokens_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000004_create_push_tokens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PushTokens::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PushTokens::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PushTokens::Audience).string().not_null())
                        .col(ColumnDef::new(PushTokens::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(PushTokens::Token).string().not_null())
                        .col(
                            ColumnDef::new(PushTokens::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_push_tokens_owner")
                        .table(PushTokens::Table)
                        .col(PushTokens::Audience)
                        .col(PushTokens::OwnerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PushTokens::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PushTokens {
        Table,
        Id,
        Audience,
        OwnerId,
        Token,
        CreatedAt,
    }
}
