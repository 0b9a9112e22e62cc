//! Read-only access to the external order and customer records.

use sqlx::PgPool;

use relay_common::error::AppError;
use relay_common::types::{Customer, Order};

pub struct OrderRepository;

impl OrderRepository {
    pub async fn find(pool: &PgPool, order_id: &str) -> Result<Option<Order>, AppError> {
        let order: Option<Order> = sqlx::query_as(
            r#"
            SELECT id, customer_id, status, return_method, created_at,
                   actual_completion, delivery_completed_time, estimated_completion,
                   outstanding_balance_cents
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

        Ok(order)
    }

    pub async fn find_customer(
        pool: &PgPool,
        customer_id: &str,
    ) -> Result<Option<Customer>, AppError> {
        let customer: Option<Customer> =
            sqlx::query_as("SELECT id, name, phone, email FROM customers WHERE id = $1")
                .bind(customer_id)
                .fetch_optional(pool)
                .await?;

        Ok(customer)
    }

    /// Orders that still owe money, oldest first.
    pub async fn find_with_outstanding_balance(pool: &PgPool) -> Result<Vec<Order>, AppError> {
        let orders: Vec<Order> = sqlx::query_as(
            r#"
            SELECT id, customer_id, status, return_method, created_at,
                   actual_completion, delivery_completed_time, estimated_completion,
                   outstanding_balance_cents
            FROM orders
            WHERE outstanding_balance_cents > 0
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(orders)
    }
}
