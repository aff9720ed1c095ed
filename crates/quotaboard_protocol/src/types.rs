//! Canonical enums and record shapes for the ingestion core.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Canonical Enums (used across all crates)
// ============================================================================

/// Target entity schema for an import run.
/// This is the CANONICAL definition - use this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sales,
    Agents,
    Customers,
    Products,
}

impl EntityKind {
    /// All kinds in classifier scoring order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Sales,
        EntityKind::Agents,
        EntityKind::Customers,
        EntityKind::Products,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Sales => "sales",
            EntityKind::Agents => "agents",
            EntityKind::Customers => "customers",
            EntityKind::Products => "products",
        }
    }

    /// Destination table for this kind.
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(EntityKind::Sales),
            "agents" => Ok(EntityKind::Agents),
            "customers" => Ok(EntityKind::Customers),
            "products" => Ok(EntityKind::Products),
            _ => Err(format!(
                "Invalid entity kind: '{}'. Expected: sales, agents, customers, or products",
                s
            )),
        }
    }
}

/// Import write mode - how existing rows of the target kind are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Insert without touching existing rows (default)
    #[default]
    Append,
    /// Clear all existing rows of the kind before the first batch lands
    Replace,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Append => "append",
            ImportMode::Replace => "replace",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" => Ok(ImportMode::Append),
            "replace" => Ok(ImportMode::Replace),
            _ => Err(format!(
                "Invalid import mode: '{}'. Expected: append or replace",
                s
            )),
        }
    }
}

/// Lifecycle status of one import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    /// Job record created, background run not started yet
    #[default]
    Pending,
    /// Background run is decoding and committing batches
    Processing,
    /// Run finished; row-level failures may still be present
    Completed,
    /// Run aborted on a file-level, schema-level, or storage-level fault
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique import job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportId(pub String);

impl ImportId {
    /// Create a new random import ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for ImportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ImportId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Cell values
// ============================================================================

/// Best-effort typed cell content produced by the row decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Non-empty text content, if this cell holds any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

// ============================================================================
// Entity records (projected row shapes)
// ============================================================================

/// Plan period context for agent imports, passed through from submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// One sales transaction row.
///
/// Requires a date, an amount, and at least one of customer/product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub date: NaiveDate,
    pub amount: f64,
    pub quantity: f64,
    pub price: Option<f64>,
    pub customer: Option<String>,
    pub product: Option<String>,
    pub agent: Option<String>,
}

/// One sales agent row. `plan_period_*` come from the submit parameters,
/// not from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub region: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub plan_amount: Option<f64>,
    pub plan_period_start: Option<NaiveDate>,
    pub plan_period_end: Option<NaiveDate>,
}

/// One customer row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub name: String,
    pub segment: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit_price: Option<f64>,
}

/// Tagged union of the four projected row shapes.
///
/// Produced only by explicit projection functions so validation stays
/// exhaustive; a record that failed required-field validation never exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityRecord {
    Sale(SaleRecord),
    Agent(AgentRecord),
    Customer(CustomerRecord),
    Product(ProductRecord),
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Sale(_) => EntityKind::Sales,
            EntityRecord::Agent(_) => EntityKind::Agents,
            EntityRecord::Customer(_) => EntityKind::Customers,
            EntityRecord::Product(_) => EntityKind::Products,
        }
    }
}

// ============================================================================
// Job snapshot (what status polling returns)
// ============================================================================

/// One bounded error-log entry on an import job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// 1-based row position in the source file, when the error is row-level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    pub message: String,
}

impl ErrorEntry {
    pub fn row_level(row: u64, message: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            message: message.into(),
        }
    }

    pub fn run_level(message: impl Into<String>) -> Self {
        Self {
            row: None,
            message: message.into(),
        }
    }
}

/// Point-in-time copy of an import job, safe to hand to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSnapshot {
    pub id: ImportId,
    pub status: ImportStatus,
    pub mode: ImportMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    pub imported_rows: u64,
    pub failed_rows: u64,
    pub progress_percent: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub error_log: Vec<ErrorEntry>,
}
