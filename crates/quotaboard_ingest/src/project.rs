//! Row projection: one `RawRow` becomes one validated `EntityRecord`.
//!
//! Projection failures are row-level: the error string lands in the job's
//! error log and the run continues with the next row. Column lookup reuses
//! the classifier's synonym tables, so any header the classifier accepted
//! projects through the same names.

use chrono::NaiveDate;
use quotaboard_protocol::{
    AgentRecord, CustomerRecord, EntityKind, EntityRecord, PlanPeriod, ProductRecord, SaleRecord,
};

use crate::classify::{
    AGENT_COLS, AMOUNT_COLS, CATEGORY_COLS, CITY_COLS, CUSTOMER_COLS, DATE_COLS, EMAIL_COLS,
    NAME_COLS, PHONE_COLS, PLAN_COLS, PRICE_COLS, PRODUCT_COLS, QTY_COLS, REGION_COLS,
    SEGMENT_COLS, SKU_COLS,
};
use crate::decode::{parse_date_text, RawRow};
use quotaboard_protocol::CellValue;

/// Project a raw row into a record of the resolved kind.
///
/// `period` supplies the plan period for agent rows; the other kinds
/// ignore it.
pub fn project_row(
    kind: EntityKind,
    row: &RawRow,
    period: &PlanPeriod,
) -> Result<EntityRecord, String> {
    match kind {
        EntityKind::Sales => project_sale(row).map(EntityRecord::Sale),
        EntityKind::Agents => project_agent(row, period).map(EntityRecord::Agent),
        EntityKind::Customers => project_customer(row).map(EntityRecord::Customer),
        EntityKind::Products => project_product(row).map(EntityRecord::Product),
    }
}

fn project_sale(row: &RawRow) -> Result<SaleRecord, String> {
    let date = require_date(row, DATE_COLS, "date")?;
    let amount = require_number(row, AMOUNT_COLS, "amount")?;
    let customer = optional_text(row, CUSTOMER_COLS);
    let product = optional_text(row, PRODUCT_COLS);
    if customer.is_none() && product.is_none() {
        return Err("row names neither a customer nor a product".into());
    }
    Ok(SaleRecord {
        date,
        amount,
        quantity: optional_number(row, QTY_COLS, "quantity")?.unwrap_or(1.0),
        price: optional_number(row, PRICE_COLS, "price")?,
        customer,
        product,
        agent: optional_text(row, AGENT_COLS),
    })
}

fn project_agent(row: &RawRow, period: &PlanPeriod) -> Result<AgentRecord, String> {
    // Agent files label the person column either "agent" or plain "name"
    let name = optional_text(row, AGENT_COLS)
        .or_else(|| optional_text(row, NAME_COLS))
        .ok_or_else(|| "missing required value: agent name".to_string())?;
    Ok(AgentRecord {
        name,
        region: optional_text(row, REGION_COLS),
        email: optional_text(row, EMAIL_COLS),
        phone: optional_text(row, PHONE_COLS),
        plan_amount: optional_number(row, PLAN_COLS, "plan")?,
        plan_period_start: period.start,
        plan_period_end: period.end,
    })
}

fn project_customer(row: &RawRow) -> Result<CustomerRecord, String> {
    let name = optional_text(row, CUSTOMER_COLS)
        .or_else(|| optional_text(row, NAME_COLS))
        .ok_or_else(|| "missing required value: customer name".to_string())?;
    Ok(CustomerRecord {
        name,
        segment: optional_text(row, SEGMENT_COLS),
        city: optional_text(row, CITY_COLS),
        email: optional_text(row, EMAIL_COLS),
        phone: optional_text(row, PHONE_COLS),
    })
}

fn project_product(row: &RawRow) -> Result<ProductRecord, String> {
    let name = optional_text(row, PRODUCT_COLS)
        .or_else(|| optional_text(row, NAME_COLS))
        .ok_or_else(|| "missing required value: product name".to_string())?;
    Ok(ProductRecord {
        name,
        sku: optional_text(row, SKU_COLS),
        category: optional_text(row, CATEGORY_COLS),
        unit_price: optional_number(row, PRICE_COLS, "price")?,
    })
}

// ============================================================================
// Cell lookup and coercion
// ============================================================================

/// First non-null cell among the synonym columns.
fn find_cell<'a>(row: &'a RawRow, synonyms: &[&str]) -> Option<&'a CellValue> {
    synonyms
        .iter()
        .map(|name| row.get(name))
        .find(|cell| !cell.is_null())
}

fn optional_text(row: &RawRow, synonyms: &[&str]) -> Option<String> {
    find_cell(row, synonyms).map(cell_to_text)
}

fn optional_number(
    row: &RawRow,
    synonyms: &[&str],
    field: &str,
) -> Result<Option<f64>, String> {
    match find_cell(row, synonyms) {
        None => Ok(None),
        Some(cell) => cell_to_number(cell)
            .map(Some)
            .ok_or_else(|| format!("invalid {field}: {:?}", cell_to_text(cell))),
    }
}

fn require_number(row: &RawRow, synonyms: &[&str], field: &str) -> Result<f64, String> {
    let cell =
        find_cell(row, synonyms).ok_or_else(|| format!("missing required value: {field}"))?;
    cell_to_number(cell).ok_or_else(|| format!("invalid {field}: {:?}", cell_to_text(cell)))
}

fn require_date(row: &RawRow, synonyms: &[&str], field: &str) -> Result<NaiveDate, String> {
    let cell =
        find_cell(row, synonyms).ok_or_else(|| format!("missing required value: {field}"))?;
    cell_to_date(cell).ok_or_else(|| format!("invalid {field}: {:?}", cell_to_text(cell)))
}

/// Render any non-null cell as text. Whole numbers print without a
/// fractional part so a spreadsheet-typed "42" round-trips as "42".
fn cell_to_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Text(s) => s.clone(),
        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
            format!("{}", *n as i64)
        }
        CellValue::Number(n) => n.to_string(),
        CellValue::Date(d) => d.to_string(),
        CellValue::Null => String::new(),
    }
}

fn cell_to_number(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn cell_to_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d),
        CellValue::Text(s) => parse_date_text(s.trim()),
        _ => None,
    }
}
