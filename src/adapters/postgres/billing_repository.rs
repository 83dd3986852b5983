//! PostgreSQL implementation of BillingRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::billing::{
    BillingState, Customer, NewSubscription, Plan, StatusHistoryEntry, Subscription,
    SubscriptionStatus, SubscriptionUpdate,
};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::BillingRepository;

/// PostgreSQL implementation of the BillingRepository port.
///
/// All queries use bound parameters; the unique constraints in the
/// migrations back the provider-id invariants.
pub struct PostgresBillingRepository {
    pool: PgPool,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, provider_subscription_id, provider_customer_id, linked_user_id, plan_id,
    status, current_period_start, current_period_end, cancel_at_period_end,
    canceled_at, trial_start, trial_end, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    provider_customer_id: String,
    linked_user_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DomainError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Customer {
            id: CustomerId::from_uuid(row.id),
            provider_customer_id: row.provider_customer_id,
            linked_user_id: parse_user_id(row.linked_user_id)?,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    provider_subscription_id: String,
    provider_customer_id: String,
    linked_user_id: Option<String>,
    plan_id: i64,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            provider_subscription_id: row.provider_subscription_id,
            provider_customer_id: row.provider_customer_id,
            linked_user_id: parse_user_id(row.linked_user_id)?,
            plan_id: PlanId::new(row.plan_id),
            billing: BillingState {
                status: parse_status(&row.status)?,
                current_period_start: Timestamp::from_datetime(row.current_period_start),
                current_period_end: Timestamp::from_datetime(row.current_period_end),
                cancel_at_period_end: row.cancel_at_period_end,
                canceled_at: row.canceled_at.map(Timestamp::from_datetime),
                trial_start: row.trial_start.map(Timestamp::from_datetime),
                trial_end: row.trial_end.map(Timestamp::from_datetime),
            },
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatusHistoryRow {
    subscription_id: Uuid,
    from_status: Option<String>,
    to_status: String,
    changed_at: DateTime<Utc>,
    source: String,
}

impl TryFrom<StatusHistoryRow> for StatusHistoryEntry {
    type Error = DomainError;

    fn try_from(row: StatusHistoryRow) -> Result<Self, Self::Error> {
        Ok(StatusHistoryEntry {
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            from_status: row.from_status.as_deref().map(parse_status).transpose()?,
            to_status: parse_status(&row.to_status)?,
            changed_at: Timestamp::from_datetime(row.changed_at),
            source: row.source,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: i64,
    provider_price_id: String,
    name: String,
}

fn parse_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    s.parse().map_err(|_| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid status value: {}", s),
        )
    })
}

fn parse_user_id(value: Option<String>) -> Result<Option<UserId>, DomainError> {
    value
        .map(|v| {
            UserId::new(v).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })
        })
        .transpose()
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

fn subscription_not_found(id: &SubscriptionId) -> DomainError {
    DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
        .with_detail("subscription_id", id.to_string())
}

async fn insert_status_history(
    conn: &mut PgConnection,
    entry: &StatusHistoryEntry,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO subscription_status_history
            (subscription_id, from_status, to_status, changed_at, source)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.subscription_id.as_uuid())
    .bind(entry.from_status.map(|s| s.as_str()))
    .bind(entry.to_status.as_str())
    .bind(entry.changed_at.as_datetime())
    .bind(&entry.source)
    .execute(conn)
    .await
    .map_err(|e| db_error("Failed to append status history", e))?;

    Ok(())
}

fn is_unique_violation(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn find_customer_by_provider_id(
        &self,
        provider_customer_id: &str,
    ) -> Result<Option<Customer>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT id, provider_customer_id, linked_user_id, created_at
            FROM billing_customers
            WHERE provider_customer_id = $1
            "#,
        )
        .bind(provider_customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find customer", e))?;

        row.map(Customer::try_from).transpose()
    }

    async fn create_customer(
        &self,
        provider_customer_id: &str,
        linked_user_id: Option<&UserId>,
    ) -> Result<Customer, DomainError> {
        // The no-op update makes RETURNING yield the winner's row on conflict.
        let row: CustomerRow = sqlx::query_as(
            r#"
            INSERT INTO billing_customers (id, provider_customer_id, linked_user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider_customer_id)
                DO UPDATE SET provider_customer_id = EXCLUDED.provider_customer_id
            RETURNING id, provider_customer_id, linked_user_id, created_at
            "#,
        )
        .bind(CustomerId::new().as_uuid())
        .bind(provider_customer_id)
        .bind(linked_user_id.map(UserId::as_str))
        .bind(Timestamp::now().as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create customer", e))?;

        Customer::try_from(row)
    }

    async fn link_customer_user(
        &self,
        customer_id: &CustomerId,
        user_id: &UserId,
    ) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE billing_customers SET linked_user_id = $2 WHERE id = $1")
            .bind(customer_id.as_uuid())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to link customer", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::CustomerNotFound, "Customer not found")
                .with_detail("customer_id", customer_id.to_string()));
        }
        Ok(())
    }

    async fn find_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE provider_subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_subscription_by_customer(
        &self,
        provider_customer_id: &str,
        user_id: Option<&UserId>,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE provider_customer_id = $1
              AND ($2::text IS NULL OR linked_user_id IS NULL OR linked_user_id = $2)
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(provider_customer_id)
        .bind(user_id.map(UserId::as_str))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find subscription by customer", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn create_subscription(
        &self,
        new: &NewSubscription,
    ) -> Result<Subscription, DomainError> {
        let now = Timestamp::now();
        let billing = &new.billing;
        let row: SubscriptionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions (
                id, provider_subscription_id, provider_customer_id, linked_user_id, plan_id,
                status, current_period_start, current_period_end, cancel_at_period_end,
                canceled_at, trial_start, trial_end, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(SubscriptionId::new().as_uuid())
        .bind(&new.provider_subscription_id)
        .bind(&new.provider_customer_id)
        .bind(new.linked_user_id.as_ref().map(UserId::as_str))
        .bind(new.plan_id.value())
        .bind(billing.status.as_str())
        .bind(billing.current_period_start.as_datetime())
        .bind(billing.current_period_end.as_datetime())
        .bind(billing.cancel_at_period_end)
        .bind(billing.canceled_at.map(|t| *t.as_datetime()))
        .bind(billing.trial_start.map(|t| *t.as_datetime()))
        .bind(billing.trial_end.map(|t| *t.as_datetime()))
        .bind(now.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "subscriptions_provider_subscription_id_key") {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    "Provider subscription id already stored",
                )
                .with_detail("provider_subscription_id", new.provider_subscription_id.clone());
            }
            db_error("Failed to create subscription", e)
        })?;

        Subscription::try_from(row)
    }

    async fn update_subscription(
        &self,
        id: &SubscriptionId,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions SET
                plan_id = COALESCE($2, plan_id),
                linked_user_id = COALESCE($3, linked_user_id),
                updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(update.plan_id.map(|p| p.value()))
        .bind(update.linked_user_id.as_ref().map(UserId::as_str))
        .bind(Timestamp::now().as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update subscription", e))?;

        row.ok_or_else(|| subscription_not_found(id))
            .and_then(Subscription::try_from)
    }

    async fn apply_billing_state(
        &self,
        id: &SubscriptionId,
        billing: &BillingState,
        transition: Option<&StatusHistoryEntry>,
    ) -> Result<Subscription, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        if let Some(entry) = transition {
            insert_status_history(&mut tx, entry).await?;
        }

        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions SET
                status = $2,
                current_period_start = $3,
                current_period_end = $4,
                cancel_at_period_end = $5,
                canceled_at = $6,
                trial_start = $7,
                trial_end = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(billing.status.as_str())
        .bind(billing.current_period_start.as_datetime())
        .bind(billing.current_period_end.as_datetime())
        .bind(billing.cancel_at_period_end)
        .bind(billing.canceled_at.map(|t| *t.as_datetime()))
        .bind(billing.trial_start.map(|t| *t.as_datetime()))
        .bind(billing.trial_end.map(|t| *t.as_datetime()))
        .bind(Timestamp::now().as_datetime())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to write billing state", e))?;

        // Dropping the transaction without commit rolls back the history row.
        let row = row.ok_or_else(|| subscription_not_found(id))?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit billing state", e))?;

        Subscription::try_from(row)
    }

    async fn migrate_subscription_provider_id(
        &self,
        id: &SubscriptionId,
        new_provider_subscription_id: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET provider_subscription_id = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(new_provider_subscription_id)
        .bind(Timestamp::now().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "subscriptions_provider_subscription_id_key") {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    "Provider subscription id already stored",
                );
            }
            db_error("Failed to migrate subscription", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(subscription_not_found(id));
        }
        Ok(())
    }

    async fn create_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), DomainError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("Failed to acquire connection", e))?;
        insert_status_history(&mut conn, entry).await
    }

    async fn list_status_history(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<StatusHistoryEntry>, DomainError> {
        let rows: Vec<StatusHistoryRow> = sqlx::query_as(
            r#"
            SELECT subscription_id, from_status, to_status, changed_at, source
            FROM subscription_status_history
            WHERE subscription_id = $1
            ORDER BY changed_at, id
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list status history", e))?;

        rows.into_iter().map(StatusHistoryEntry::try_from).collect()
    }

    async fn find_plan_by_provider_price_id(
        &self,
        provider_price_id: &str,
    ) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT id, provider_price_id, name FROM plans WHERE provider_price_id = $1",
        )
        .bind(provider_price_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find plan", e))?;

        Ok(row.map(|r| Plan::new(PlanId::new(r.id), r.provider_price_id, r.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_rejects_unknown_values() {
        let err = parse_status("frozen").unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn parse_user_id_passes_through_null() {
        assert!(parse_user_id(None).unwrap().is_none());
        assert!(parse_user_id(Some(String::new())).is_err());
    }

    #[test]
    fn history_row_converts_nullable_from_status() {
        let row = StatusHistoryRow {
            subscription_id: Uuid::new_v4(),
            from_status: None,
            to_status: "active".to_string(),
            changed_at: Utc::now(),
            source: "customer.subscription.created".to_string(),
        };

        let entry = StatusHistoryEntry::try_from(row).unwrap();
        assert!(entry.from_status.is_none());
        assert_eq!(entry.to_status, SubscriptionStatus::Active);
    }

    // Needs a disposable database:
    // DATABASE_URL=postgres://localhost/billing_test cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn billing_write_to_missing_row_rolls_back_history() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let repo = PostgresBillingRepository::new(pool);
        let id = SubscriptionId::new();
        let now = Timestamp::now();
        let billing = BillingState {
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            canceled_at: None,
            trial_start: None,
            trial_end: None,
        };
        let entry = StatusHistoryEntry::new(
            id,
            Some(SubscriptionStatus::Trialing),
            SubscriptionStatus::Active,
            "customer.subscription.updated",
        );

        let result = repo.apply_billing_state(&id, &billing, Some(&entry)).await;

        assert!(result.is_err());
        assert!(repo.list_status_history(&id).await.unwrap().is_empty());
    }
}
