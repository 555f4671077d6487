use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whole FCFA; the currency has no minor unit.
pub type Amount = i64;

pub const DEFAULT_CURRENCY: &str = "XOF";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub phone: String,
    pub name: String,
    pub balance: Amount,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Account {
    pub fn new(user_id: &str, phone: &str, name: &str, balance: Amount) -> Self {
        Self {
            user_id: user_id.to_string(),
            phone: phone.to_string(),
            name: name.to_string(),
            balance,
            currency: default_currency(),
            created_at: None,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    Payment,
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    /// Phase one of two-phase commit succeeded everywhere.
    Prepared,
    Committed,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub from_user: String,
    pub to_user: Option<String>,
    pub amount: Amount,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Transaction {
    pub fn new(
        transaction_id: String,
        kind: TransactionType,
        from_user: &str,
        to_user: Option<&str>,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            kind,
            from_user: from_user.to_string(),
            to_user: to_user.map(str::to_string),
            amount,
            currency: default_currency(),
            status: TransactionStatus::Pending,
            created_at,
            completed_at: None,
            error_message: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn mark_prepared(&mut self) {
        self.status = TransactionStatus::Prepared;
    }

    pub fn mark_committed(&mut self, at: DateTime<Utc>) {
        self.status = TransactionStatus::Committed;
        self.completed_at = Some(at);
    }

    pub fn mark_aborted(&mut self, reason: &str, at: DateTime<Utc>) {
        self.status = TransactionStatus::Aborted;
        self.error_message = Some(reason.to_string());
        self.completed_at = Some(at);
    }

    pub fn mark_failed(&mut self, error: &str, at: DateTime<Utc>) {
        self.status = TransactionStatus::Failed;
        self.error_message = Some(error.to_string());
        self.completed_at = Some(at);
    }

    /// A payment accepted offline and not yet settled on the master.
    pub fn is_queued(&self) -> bool {
        self.kind == TransactionType::Payment
            && self.status == TransactionStatus::Pending
            && self.metadata.get("queued") == Some(&serde_json::Value::Bool(true))
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.from_user == user_id || self.to_user.as_deref() == Some(user_id)
    }
}

/// A transaction as recorded in one node's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub node_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Accounts and ledger history loaded onto every node at start-up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedData {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transfer,
    Balance,
    History,
    Payment,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Transfer,
        OperationKind::Balance,
        OperationKind::History,
        OperationKind::Payment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Transfer => "transfer",
            OperationKind::Balance => "balance",
            OperationKind::History => "history",
            OperationKind::Payment => "payment",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operation happened relative to the partition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    During,
    After,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Before, Phase::During, Phase::After];

    /// Labels such as `before_partition` map onto their phase; anything
    /// unrecognised counts as `Before`.
    pub fn from_label(label: &str) -> Self {
        if label.contains("before") {
            Phase::Before
        } else if label.contains("during") {
            Phase::During
        } else if label.contains("after") {
            Phase::After
        } else {
            Phase::Before
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::During => "during",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyTag {
    CpStrict,
    Adaptive,
    AdaptiveCp,
    AdaptiveApQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    Cache,
    ReplicaLocal,
    Master,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Cached,
    Recent,
    GuaranteedAccurate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Committed,
    /// Debited, provider notification deferred.
    Pending,
    /// Held on the origin node until the master is reachable again.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultPayload {
    Transfer {
        new_balance_from: Option<Amount>,
        new_balance_to: Option<Amount>,
    },
    Balance {
        balance: Amount,
        source: ReadSource,
        freshness: Freshness,
    },
    History {
        transactions: Vec<LedgerEntry>,
        count: usize,
        source: ReadSource,
    },
    Payment {
        receipt_id: Option<String>,
        status: PaymentStatus,
        new_balance: Option<Amount>,
    },
}

/// Outcome of one user-facing operation.
///
/// Business failures (insufficient balance, unreachable master) are
/// reported here with `success == false`; `SimError` is reserved for
/// faults of the simulator itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub partition_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResultPayload>,
}

impl OperationResult {
    pub fn succeeded(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms,
            transaction_id: None,
            error: None,
            reason: None,
            message: None,
            warning: None,
            partition_mode: false,
            strategy: None,
            available_actions: Vec::new(),
            payload: None,
        }
    }

    pub fn failed(error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::succeeded(latency_ms)
        }
    }

    pub fn with_transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyTag) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.available_actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_payload(mut self, payload: ResultPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn in_partition_mode(mut self) -> Self {
        self.partition_mode = true;
        self
    }

    pub fn balance(&self) -> Option<Amount> {
        match &self.payload {
            Some(ResultPayload::Balance { balance, .. }) => Some(*balance),
            _ => None,
        }
    }

    pub fn read_source(&self) -> Option<ReadSource> {
        match &self.payload {
            Some(ResultPayload::Balance { source, .. })
            | Some(ResultPayload::History { source, .. }) => Some(*source),
            _ => None,
        }
    }
}
