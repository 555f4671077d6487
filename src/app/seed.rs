use crate::domain::model::{
    Account, Amount, SeedData, Transaction, TransactionStatus, TransactionType,
};
use crate::domain::ports::Storage;
use crate::utils::error::{Result, SimError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const USERS_FILE: &str = "users.json";
pub const TRANSACTIONS_FILE: &str = "initial_transactions.json";

fn default_kind() -> TransactionType {
    TransactionType::Transfer
}

fn default_status() -> TransactionStatus {
    TransactionStatus::Committed
}

/// Ledger entry as found in the seed file; most fields are optional.
#[derive(Debug, Deserialize)]
struct SeedTransaction {
    transaction_id: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: TransactionType,
    from_user: String,
    #[serde(default)]
    to_user: Option<String>,
    amount: Amount,
    #[serde(default = "default_status")]
    status: TransactionStatus,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl SeedTransaction {
    fn into_transaction(self, loaded_at: DateTime<Utc>) -> Transaction {
        let created_at = self.created_at.unwrap_or(loaded_at);
        let mut transaction = Transaction::new(
            self.transaction_id,
            self.kind,
            &self.from_user,
            self.to_user.as_deref(),
            self.amount,
            created_at,
        );
        transaction.status = self.status;
        transaction.metadata = self.metadata;
        if self.status == TransactionStatus::Committed {
            transaction.completed_at = Some(created_at);
        }
        transaction
    }
}

fn parse<T: for<'de> Deserialize<'de>>(file: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| SimError::SeedDataError {
        message: format!("{}: {}", file, e),
    })
}

impl SeedData {
    /// Read `users.json` and `initial_transactions.json` from `storage`,
    /// falling back to the built-in sample set when the users file is absent.
    pub async fn load<S: Storage>(storage: &S, loaded_at: DateTime<Utc>) -> Result<Self> {
        if !storage.exists(USERS_FILE).await {
            tracing::warn!(
                "{} not found in data directory, using built-in sample accounts",
                USERS_FILE
            );
            return Ok(Self::sample(loaded_at));
        }

        let mut accounts: Vec<Account> = parse(USERS_FILE, &storage.read_file(USERS_FILE).await?)?;
        for account in &mut accounts {
            account.created_at.get_or_insert(loaded_at);
        }

        let transactions = if storage.exists(TRANSACTIONS_FILE).await {
            let raw: Vec<SeedTransaction> = parse(
                TRANSACTIONS_FILE,
                &storage.read_file(TRANSACTIONS_FILE).await?,
            )?;
            raw.into_iter()
                .map(|tx| tx.into_transaction(loaded_at))
                .collect()
        } else {
            tracing::warn!("{} not found, starting with empty ledgers", TRANSACTIONS_FILE);
            Vec::new()
        };

        tracing::info!(
            "Loaded {} accounts and {} transactions",
            accounts.len(),
            transactions.len()
        );
        Ok(Self {
            accounts,
            transactions,
        })
    }

    /// Five funded accounts and a short committed history.
    pub fn sample(loaded_at: DateTime<Utc>) -> Self {
        let people = [
            ("user_001", "+221770000001", "Awa Diop", 150_000),
            ("user_002", "+221770000002", "Moussa Ndiaye", 45_000),
            ("user_003", "+221770000003", "Fatou Sow", 80_000),
            ("user_004", "+221770000004", "Ibrahima Fall", 25_000),
            ("user_005", "+221770000005", "Aminata Ba", 60_000),
        ];
        let accounts = people
            .iter()
            .map(|(id, phone, name, balance)| {
                let mut account = Account::new(id, phone, name, *balance);
                account.created_at = Some(loaded_at);
                account
            })
            .collect();

        let history = [
            ("TX_seed0001", "user_001", "user_002", 5_000),
            ("TX_seed0002", "user_003", "user_004", 2_500),
            ("TX_seed0003", "user_002", "user_005", 1_000),
        ];
        let transactions = history
            .iter()
            .map(|(id, from, to, amount)| {
                let mut tx = Transaction::new(
                    id.to_string(),
                    TransactionType::Transfer,
                    from,
                    Some(*to),
                    *amount,
                    loaded_at,
                );
                tx.mark_committed(loaded_at);
                tx
            })
            .collect();

        Self {
            accounts,
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_files_fall_back_to_sample() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        let seed = SeedData::load(&storage, Utc::now()).await.unwrap();
        assert_eq!(seed.accounts.len(), 5);
        assert!(seed.accounts.iter().any(|a| a.user_id == "user_003"));
        assert_eq!(seed.transactions.len(), 3);
    }

    #[tokio::test]
    async fn lenient_transaction_format() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(USERS_FILE),
            r#"[{"user_id":"user_001","phone":"+221770000001","name":"Awa","balance":1000}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(TRANSACTIONS_FILE),
            r#"[{"transaction_id":"TX_1","from_user":"user_001","to_user":"user_002","amount":250},
                {"transaction_id":"PAY_1","type":"payment","from_user":"user_001","amount":90,"status":"failed"}]"#,
        )
        .unwrap();

        let loaded_at = Utc::now();
        let seed = SeedData::load(&LocalStorage::new(dir.path()), loaded_at)
            .await
            .unwrap();

        assert_eq!(seed.accounts[0].created_at, Some(loaded_at));
        let transfer = &seed.transactions[0];
        assert_eq!(transfer.kind, TransactionType::Transfer);
        assert_eq!(transfer.status, TransactionStatus::Committed);
        assert_eq!(transfer.created_at, loaded_at);
        assert_eq!(seed.transactions[1].status, TransactionStatus::Failed);
        assert!(seed.transactions[1].to_user.is_none());
    }

    #[tokio::test]
    async fn malformed_users_file_is_a_seed_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(USERS_FILE), b"{ not json").unwrap();

        let err = SeedData::load(&LocalStorage::new(dir.path()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::SeedDataError { .. }));
    }
}
