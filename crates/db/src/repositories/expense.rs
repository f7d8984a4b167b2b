use async_trait::async_trait;
use sqlx::Row;

use imprest_core::domain::advance::AdvanceId;
use imprest_core::domain::expense::{Expense, ExpenseId};
use imprest_core::domain::profile::ActorId;

use super::{
    decode_err, format_timestamp, parse_date, parse_decimal, parse_timestamp, ExpenseRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let advance_id: String = row.try_get("advance_id").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let category: String = row.try_get("category").map_err(decode_err)?;
    let amount: String = row.try_get("amount").map_err(decode_err)?;
    let spent_on: String = row.try_get("spent_on").map_err(decode_err)?;
    let receipt_url: Option<String> = row.try_get("receipt_url").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Expense {
        id: ExpenseId(id),
        advance_id: AdvanceId(advance_id),
        description,
        category,
        amount: parse_decimal("amount", &amount)?,
        spent_on: parse_date("spent_on", &spent_on)?,
        receipt_url,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn insert(&self, expense: &Expense) -> Result<bool, RepositoryError> {
        // The status check and the write are one statement, so a close that
        // commits first leaves zero rows affected.
        let result = sqlx::query(
            "INSERT INTO expense (id, advance_id, description, category, amount, spent_on,
                                  receipt_url, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
             WHERE EXISTS (
                 SELECT 1 FROM advance_request WHERE id = ?2 AND status = 'approved'
             )",
        )
        .bind(&expense.id.0)
        .bind(&expense.advance_id.0)
        .bind(&expense.description)
        .bind(&expense.category)
        .bind(expense.amount.to_string())
        .bind(expense.spent_on.format("%Y-%m-%d").to_string())
        .bind(&expense.receipt_url)
        .bind(format_timestamp(expense.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_advance(
        &self,
        advance_id: &AdvanceId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, advance_id, description, category, amount, spent_on, receipt_url, created_at
             FROM expense WHERE advance_id = ?
             ORDER BY spent_on ASC, created_at ASC",
        )
        .bind(&advance_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }

    async fn list_for_requester(
        &self,
        requester_id: &ActorId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT e.id, e.advance_id, e.description, e.category, e.amount, e.spent_on,
                    e.receipt_url, e.created_at
             FROM expense e
             JOIN advance_request a ON a.id = e.advance_id
             WHERE a.requester_id = ?
             ORDER BY e.spent_on ASC, e.created_at ASC",
        )
        .bind(requester_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }
}
