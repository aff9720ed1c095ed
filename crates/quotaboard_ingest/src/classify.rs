//! Schema classification: which of the four entity schemas does a file carry?
//!
//! Each schema is scored as the matched weight fraction of its signature
//! columns against the normalized header. Required columns carry double
//! weight, so a header missing them cannot clear the confidence threshold.
//! An explicit `data_type` override short-circuits scoring entirely.
//!
//! Below-threshold (or tied) classification is a terminal failure rather
//! than a guess: misfiling sales rows into the products table would silently
//! corrupt unrelated analytics.

use quotaboard_protocol::defaults::SCHEMA_CONFIDENCE_THRESHOLD;
use quotaboard_protocol::EntityKind;
use tracing::debug;

use crate::ImportError;

// ============================================================================
// Column synonyms (shared with projection)
// ============================================================================

pub(crate) const DATE_COLS: &[&str] = &["date", "sale_date", "order_date", "day", "period"];
pub(crate) const AMOUNT_COLS: &[&str] = &["amount", "total", "sum", "revenue", "total_amount"];
pub(crate) const CUSTOMER_COLS: &[&str] =
    &["customer", "client", "buyer", "customer_name", "client_name"];
pub(crate) const PRODUCT_COLS: &[&str] = &["product", "item", "product_name", "item_name"];
pub(crate) const QTY_COLS: &[&str] = &["qty", "quantity", "count", "units"];
pub(crate) const PRICE_COLS: &[&str] = &["price", "unit_price", "cost", "list_price"];
pub(crate) const AGENT_COLS: &[&str] = &[
    "agent",
    "manager",
    "salesperson",
    "sales_rep",
    "rep",
    "agent_name",
];
pub(crate) const NAME_COLS: &[&str] = &["name", "full_name", "title"];
pub(crate) const REGION_COLS: &[&str] = &["region", "territory", "area", "branch"];
pub(crate) const PLAN_COLS: &[&str] = &["plan", "plan_amount", "target", "quota", "sales_plan"];
pub(crate) const EMAIL_COLS: &[&str] = &["email", "e_mail", "mail"];
pub(crate) const PHONE_COLS: &[&str] = &["phone", "telephone", "tel", "mobile"];
pub(crate) const SEGMENT_COLS: &[&str] = &["segment", "tier", "customer_type"];
pub(crate) const CITY_COLS: &[&str] = &["city", "town", "location"];
pub(crate) const SKU_COLS: &[&str] = &["sku", "article", "product_code", "code", "barcode"];
pub(crate) const CATEGORY_COLS: &[&str] = &["category", "group", "product_group"];

/// True when the normalized header contains any of the synonym names.
fn header_has(header: &[String], synonyms: &[&str]) -> bool {
    header.iter().any(|h| synonyms.contains(&h.as_str()))
}

/// Signature column: synonym set plus its weight in the schema score.
/// Required columns carry weight 2, supporting columns weight 1.
struct Signature {
    synonyms: &'static [&'static str],
    weight: u32,
}

fn signature(kind: EntityKind) -> &'static [Signature] {
    match kind {
        EntityKind::Sales => &[
            Signature { synonyms: DATE_COLS, weight: 2 },
            Signature { synonyms: AMOUNT_COLS, weight: 2 },
            Signature { synonyms: CUSTOMER_COLS, weight: 1 },
            Signature { synonyms: PRODUCT_COLS, weight: 1 },
            Signature { synonyms: QTY_COLS, weight: 1 },
            Signature { synonyms: PRICE_COLS, weight: 1 },
            Signature { synonyms: AGENT_COLS, weight: 1 },
        ],
        EntityKind::Agents => &[
            Signature { synonyms: AGENT_COLS, weight: 2 },
            Signature { synonyms: PLAN_COLS, weight: 2 },
            Signature { synonyms: REGION_COLS, weight: 1 },
            Signature { synonyms: EMAIL_COLS, weight: 1 },
            Signature { synonyms: PHONE_COLS, weight: 1 },
        ],
        EntityKind::Customers => &[
            Signature { synonyms: CUSTOMER_COLS, weight: 2 },
            Signature { synonyms: NAME_COLS, weight: 2 },
            Signature { synonyms: SEGMENT_COLS, weight: 1 },
            Signature { synonyms: CITY_COLS, weight: 1 },
            Signature { synonyms: EMAIL_COLS, weight: 1 },
        ],
        EntityKind::Products => &[
            Signature { synonyms: PRODUCT_COLS, weight: 2 },
            Signature { synonyms: SKU_COLS, weight: 2 },
            Signature { synonyms: CATEGORY_COLS, weight: 1 },
            Signature { synonyms: PRICE_COLS, weight: 1 },
        ],
    }
}

/// Score one schema against a header: matched weight / total weight.
pub fn score(kind: EntityKind, header: &[String]) -> f64 {
    let sig = signature(kind);
    let total: u32 = sig.iter().map(|s| s.weight).sum();
    let matched: u32 = sig
        .iter()
        .filter(|s| header_has(header, s.synonyms))
        .map(|s| s.weight)
        .sum();
    matched as f64 / total as f64
}

/// Resolve the entity kind for a run.
///
/// An explicit override wins unconditionally. Otherwise the best-scoring
/// schema must clear `threshold` and strictly beat the runner-up.
pub fn classify(
    header: &[String],
    override_kind: Option<EntityKind>,
    threshold: f64,
) -> Result<EntityKind, ImportError> {
    if let Some(kind) = override_kind {
        debug!(kind = %kind, "Entity kind set by explicit override");
        return Ok(kind);
    }

    let mut scores: Vec<(EntityKind, f64)> = EntityKind::ALL
        .iter()
        .map(|&kind| (kind, score(kind, header)))
        .collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (best_kind, best) = scores[0];
    let (_, second) = scores[1];

    debug!(
        best = %best_kind,
        score = best,
        runner_up = second,
        "Schema classification scored"
    );

    if best < threshold {
        return Err(ImportError::SchemaUndetermined(format!(
            "no schema matched the header confidently (best: {} at {:.2}, threshold {:.2})",
            best_kind, best, threshold
        )));
    }
    if (best - second).abs() < f64::EPSILON {
        return Err(ImportError::SchemaUndetermined(format!(
            "header matches {} and {} equally well ({:.2})",
            best_kind, scores[1].0, best
        )));
    }

    Ok(best_kind)
}

/// Resolve with the canonical threshold.
pub fn classify_default(
    header: &[String],
    override_kind: Option<EntityKind>,
) -> Result<EntityKind, ImportError> {
    classify(header, override_kind, SCHEMA_CONFIDENCE_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classifies_sales_header() {
        let h = header(&["date", "customer", "product", "qty", "price", "amount"]);
        assert_eq!(classify_default(&h, None).unwrap(), EntityKind::Sales);
    }

    #[test]
    fn classifies_agents_header() {
        let h = header(&["agent", "region", "plan_amount", "phone"]);
        assert_eq!(classify_default(&h, None).unwrap(), EntityKind::Agents);
    }

    #[test]
    fn classifies_customers_header() {
        let h = header(&["customer_name", "segment", "city", "email"]);
        assert_eq!(classify_default(&h, None).unwrap(), EntityKind::Customers);
    }

    #[test]
    fn classifies_products_header() {
        let h = header(&["product_name", "sku", "category", "unit_price"]);
        assert_eq!(classify_default(&h, None).unwrap(), EntityKind::Products);
    }

    #[test]
    fn unknown_header_is_undetermined() {
        let h = header(&["foo", "bar", "baz"]);
        let err = classify_default(&h, None).unwrap_err();
        assert!(matches!(err, ImportError::SchemaUndetermined(_)));
    }

    #[test]
    fn missing_required_columns_fail_despite_support() {
        // qty/price/customer without date+amount must not pass as sales
        let h = header(&["customer", "qty", "price"]);
        let err = classify_default(&h, None).unwrap_err();
        assert!(matches!(err, ImportError::SchemaUndetermined(_)));
    }

    #[test]
    fn override_short_circuits_scoring() {
        let h = header(&["foo", "bar"]);
        assert_eq!(
            classify_default(&h, Some(EntityKind::Products)).unwrap(),
            EntityKind::Products
        );
    }

    #[test]
    fn tie_is_undetermined() {
        // "email" scores 1/7 for both agents and customers. A permissive
        // threshold isolates the tie check from the confidence check.
        let h = header(&["email"]);
        let err = classify(&h, None, 0.1).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("equally well"), "unexpected message: {msg}");
    }

    #[test]
    fn ambiguous_shared_columns_resolve_by_weight() {
        // "customer" is weight 2 for customers but only weight 1 for sales,
        // so a customer-centric header must not drift into sales.
        let h = header(&["customer", "name", "city"]);
        assert_eq!(classify_default(&h, None).unwrap(), EntityKind::Customers);
    }
}
