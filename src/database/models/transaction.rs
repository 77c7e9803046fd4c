// Database models - Purchase transactions
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store environment a purchase transaction was made in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Sandbox,
    Xcode,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Sandbox => "sandbox",
            Environment::Xcode => "xcode",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" => Environment::Production,
            "sandbox" => Environment::Sandbox,
            "xcode" => Environment::Xcode,
            _ => Environment::Production,
        }
    }
}

/// One request to validate a purchase with the server.
///
/// `transaction_id` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionValidation {
    pub transaction_id: String,
    pub original_transaction_id: String,
    pub product_id: String,
    pub environment: Environment,
}

impl TransactionValidation {
    pub fn new(
        transaction_id: impl Into<String>,
        original_transaction_id: impl Into<String>,
        product_id: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            original_transaction_id: original_transaction_id.into(),
            product_id: product_id.into(),
            environment,
        }
    }
}

/// A transaction whose validation failed and may be retried
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedTransaction {
    pub transaction_id: String,
    pub original_transaction_id: String,
    pub product_id: String,
    pub environment: Environment,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl FailedTransaction {
    pub fn from_validation(validation: &TransactionValidation, failed_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id: validation.transaction_id.clone(),
            original_transaction_id: validation.original_transaction_id.clone(),
            product_id: validation.product_id.clone(),
            environment: validation.environment,
            failed_at,
            retry_count: 0,
        }
    }

    pub fn to_validation(&self) -> TransactionValidation {
        TransactionValidation {
            transaction_id: self.transaction_id.clone(),
            original_transaction_id: self.original_transaction_id.clone(),
            product_id: self.product_id.clone(),
            environment: self.environment,
        }
    }
}

/// A transaction the server has acknowledged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedTransaction {
    pub transaction_id: String,
    pub completed_at: DateTime<Utc>,
}
