use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::advance::AdvanceId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub advance_id: AdvanceId,
    pub description: String,
    pub category: String,
    pub amount: Decimal,
    pub spent_on: NaiveDate,
    /// Location of the uploaded receipt in blob storage.
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub amount: Decimal,
    pub spent_on: NaiveDate,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

fn default_category() -> String {
    "general".to_owned()
}

impl ExpenseDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::InvalidInput(
                "expense amount must be greater than zero".to_owned(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::InvalidInput("expense description is required".to_owned()));
        }
        if let Some(url) = &self.receipt_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DomainError::InvalidInput(
                    "receipt_url must start with http:// or https://".to_owned(),
                ));
            }
        }
        Ok(())
    }

    pub fn into_expense(self, advance_id: AdvanceId, now: DateTime<Utc>) -> Expense {
        let category = self.category.trim();
        Expense {
            id: ExpenseId(Uuid::new_v4().to_string()),
            advance_id,
            description: self.description.trim().to_owned(),
            category: if category.is_empty() { default_category() } else { category.to_owned() },
            amount: self.amount,
            spent_on: self.spent_on,
            receipt_url: self.receipt_url,
            created_at: now,
        }
    }
}
