use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        admin_wallet::{self, Entity as AdminWalletEntity, SINGLETON_ID},
        producer_wallet::{self, Entity as ProducerWalletEntity},
        wallet_transaction::{self, Entity as WalletTransactionEntity, TransactionDirection},
    },
    errors::ServiceError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletSummaryResponse {
    pub balance: Decimal,
    pub currency: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct WalletTransactionsResponse {
    pub items: Vec<wallet_transaction::Model>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub has_more: bool,
}

/// Ledger accounting over producer wallets and the singleton platform
/// wallet.
///
/// Every balance change is applied as a single relative UPDATE at the
/// storage layer (never load-then-save) and leaves exactly one matching
/// transaction row. This component carries no idempotency key of its own;
/// callers enforce the "first transition only" guard.
#[derive(Clone)]
pub struct WalletService {
    db: Arc<DbPool>,
}

impl WalletService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Credits a producer for an order payment and mirrors the amount onto
    /// the platform wallet. Must run inside the caller's unit of work.
    #[instrument(skip(conn), fields(producer_id = %producer_id, order_id = %order_id))]
    pub async fn credit<C: ConnectionTrait>(
        conn: &C,
        producer_id: Uuid,
        amount: Decimal,
        currency: &str,
        order_id: Uuid,
        description: String,
    ) -> Result<(), ServiceError> {
        Self::post(
            conn,
            producer_id,
            amount,
            currency,
            order_id,
            description,
            TransactionDirection::Credit,
        )
        .await
    }

    /// Debits a producer (post-payment cancellation refund) and mirrors
    /// the outflow on the platform wallet. The balance may go negative.
    #[instrument(skip(conn), fields(producer_id = %producer_id, order_id = %order_id))]
    pub async fn debit<C: ConnectionTrait>(
        conn: &C,
        producer_id: Uuid,
        amount: Decimal,
        currency: &str,
        order_id: Uuid,
        description: String,
    ) -> Result<(), ServiceError> {
        Self::post(
            conn,
            producer_id,
            amount,
            currency,
            order_id,
            description,
            TransactionDirection::Debit,
        )
        .await
    }

    async fn post<C: ConnectionTrait>(
        conn: &C,
        producer_id: Uuid,
        amount: Decimal,
        currency: &str,
        order_id: Uuid,
        description: String,
        direction: TransactionDirection,
    ) -> Result<(), ServiceError> {
        let amount = amount.round_dp(2);
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Ledger amounts must be positive".to_string(),
            ));
        }

        let delta = match direction {
            TransactionDirection::Credit => amount,
            TransactionDirection::Debit => -amount,
        };

        Self::apply_producer_delta(conn, producer_id, delta, currency).await?;

        let entry = wallet_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            producer_id: Set(producer_id),
            direction: Set(direction),
            amount: Set(amount),
            currency: Set(currency.to_string()),
            description: Set(Some(description)),
            order_id: Set(Some(order_id)),
            created_at: Set(Utc::now()),
        };
        entry.insert(conn).await?;

        Self::apply_admin_delta(conn, delta, currency).await?;

        info!(%producer_id, %order_id, %amount, ?direction, "Ledger entry posted");
        Ok(())
    }

    /// Applies a signed delta to the producer's wallet with a single
    /// relative UPDATE; creates the wallet lazily when missing.
    async fn apply_producer_delta<C: ConnectionTrait>(
        conn: &C,
        producer_id: Uuid,
        delta: Decimal,
        currency: &str,
    ) -> Result<(), ServiceError> {
        let updated = ProducerWalletEntity::update_many()
            .col_expr(
                producer_wallet::Column::Balance,
                Expr::col(producer_wallet::Column::Balance).add(Expr::val(delta)),
            )
            .col_expr(
                producer_wallet::Column::UpdatedAt,
                Expr::val(Utc::now()).into(),
            )
            .filter(producer_wallet::Column::ProducerId.eq(producer_id))
            .exec(conn)
            .await?;

        if updated.rows_affected > 0 {
            return Ok(());
        }

        let now = Utc::now();
        let wallet = producer_wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            producer_id: Set(producer_id),
            balance: Set(delta),
            currency: Set(currency.to_string()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        match wallet.insert(conn).await {
            Ok(_) => Ok(()),
            // Lost the creation race: another writer inserted the wallet
            // between our UPDATE and INSERT. Fall back to the UPDATE.
            Err(err) if ServiceError::is_unique_violation(&err) => {
                ProducerWalletEntity::update_many()
                    .col_expr(
                        producer_wallet::Column::Balance,
                        Expr::col(producer_wallet::Column::Balance).add(Expr::val(delta)),
                    )
                    .col_expr(
                        producer_wallet::Column::UpdatedAt,
                        Expr::val(Utc::now()).into(),
                    )
                    .filter(producer_wallet::Column::ProducerId.eq(producer_id))
                    .exec(conn)
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies a signed delta to the singleton platform wallet.
    async fn apply_admin_delta<C: ConnectionTrait>(
        conn: &C,
        delta: Decimal,
        currency: &str,
    ) -> Result<(), ServiceError> {
        let updated = AdminWalletEntity::update_many()
            .col_expr(
                admin_wallet::Column::Balance,
                Expr::col(admin_wallet::Column::Balance).add(Expr::val(delta)),
            )
            .col_expr(admin_wallet::Column::UpdatedAt, Expr::val(Utc::now()).into())
            .filter(admin_wallet::Column::Id.eq(SINGLETON_ID))
            .exec(conn)
            .await?;

        if updated.rows_affected > 0 {
            return Ok(());
        }

        let now = Utc::now();
        let wallet = admin_wallet::ActiveModel {
            id: Set(SINGLETON_ID),
            balance: Set(delta),
            currency: Set(currency.to_string()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        match wallet.insert(conn).await {
            Ok(_) => Ok(()),
            Err(err) if ServiceError::is_unique_violation(&err) => {
                AdminWalletEntity::update_many()
                    .col_expr(
                        admin_wallet::Column::Balance,
                        Expr::col(admin_wallet::Column::Balance).add(Expr::val(delta)),
                    )
                    .col_expr(admin_wallet::Column::UpdatedAt, Expr::val(Utc::now()).into())
                    .filter(admin_wallet::Column::Id.eq(SINGLETON_ID))
                    .exec(conn)
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Wallet summary for a producer; creates a zero-balance wallet on
    /// first read, as the dashboard expects one to exist.
    #[instrument(skip(self))]
    pub async fn summary(
        &self,
        producer_id: Uuid,
        currency: &str,
    ) -> Result<WalletSummaryResponse, ServiceError> {
        let wallet = self.ensure_producer_wallet(producer_id, currency).await?;
        Ok(WalletSummaryResponse {
            balance: wallet.balance,
            currency: wallet.currency,
            updated_at: wallet.updated_at,
        })
    }

    async fn ensure_producer_wallet(
        &self,
        producer_id: Uuid,
        currency: &str,
    ) -> Result<producer_wallet::Model, ServiceError> {
        if let Some(wallet) = ProducerWalletEntity::find()
            .filter(producer_wallet::Column::ProducerId.eq(producer_id))
            .one(&*self.db)
            .await?
        {
            return Ok(wallet);
        }

        let now = Utc::now();
        let wallet = producer_wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            producer_id: Set(producer_id),
            balance: Set(Decimal::ZERO),
            currency: Set(currency.to_string()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        match wallet.insert(&*self.db).await {
            Ok(model) => Ok(model),
            Err(err) if ServiceError::is_unique_violation(&err) => ProducerWalletEntity::find()
                .filter(producer_wallet::Column::ProducerId.eq(producer_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("wallet vanished after creation race".to_string())
                }),
            Err(err) => Err(err.into()),
        }
    }

    /// Paginated credit/debit history for a producer, most recent first.
    #[instrument(skip(self))]
    pub async fn transactions(
        &self,
        producer_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<WalletTransactionsResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let paginator = WalletTransactionEntity::find()
            .filter(wallet_transaction::Column::ProducerId.eq(producer_id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;
        let has_more = (page - 1) * limit + (items.len() as u64) < total;

        Ok(WalletTransactionsResponse {
            items,
            page,
            page_size: limit,
            total,
            has_more,
        })
    }

    /// Platform wallet summary for admins; the singleton row is created on
    /// first read when no payment has flowed yet.
    #[instrument(skip(self))]
    pub async fn platform_summary(
        &self,
        currency: &str,
    ) -> Result<WalletSummaryResponse, ServiceError> {
        if let Some(wallet) = AdminWalletEntity::find_by_id(SINGLETON_ID)
            .one(&*self.db)
            .await?
        {
            return Ok(WalletSummaryResponse {
                balance: wallet.balance,
                currency: wallet.currency,
                updated_at: wallet.updated_at,
            });
        }

        Ok(WalletSummaryResponse {
            balance: Decimal::ZERO,
            currency: currency.to_string(),
            updated_at: None,
        })
    }
}
