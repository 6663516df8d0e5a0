// tests/normalize/normalizer_test.rs
use chrono::NaiveDate;
use querygate::normalize::{
    FixedClock, NormalizeError, NormalizeResult, Normalized, Normalizer, NormalizerPass,
    NormalizerRules, PassContext, ScopePass,
};
use querygate::safety::validate_select_only;
use querygate::schema::{restaurant_catalog, LookupError};
use querygate::sql::{LimitOffset, Query};

fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

fn normalizer() -> Normalizer {
    let catalog = restaurant_catalog().unwrap();
    Normalizer::new(&catalog, "restaurant", &NormalizerRules::default())
        .unwrap()
        .with_clock(FixedClock(wednesday()))
}

fn run(sql: &str, question: &str) -> NormalizeResult<Normalized> {
    let safe = validate_select_only(sql).unwrap();
    normalizer().normalize(&safe, question)
}

#[test]
fn test_standard_pass_order() {
    assert_eq!(
        normalizer().pass_names(),
        vec![
            "scope",
            "completed_state",
            "relative_week",
            "banned_column",
            "product_revenue"
        ]
    );
}

// =============================================================================
// Checks
// =============================================================================

#[test]
fn test_missing_scope_fails_before_any_rewrite() {
    let err = run(
        "SELECT SUM(total) FROM sales WHERE restaurant = 'Cafe Roma' AND closed_at >= '2024-01-01'",
        "sales last week",
    )
    .unwrap_err();
    assert_eq!(
        err,
        NormalizeError::MissingScopeParam {
            param: "restaurant".into()
        }
    );
}

#[test]
fn test_missing_completed_state() {
    let err = run(
        "SELECT SUM(s.total) FROM sales s WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s)",
        "total sales",
    )
    .unwrap_err();
    assert_eq!(
        err,
        NormalizeError::MissingRequiredFilter {
            table: "sales".into(),
            filter: "sales.sale_state = 'CLOSED'".into()
        }
    );
    assert_eq!(
        err.to_string(),
        "SQL reading sales must filter on sales.sale_state = 'CLOSED'"
    );
}

#[test]
fn test_completed_state_in_join_condition_counts() {
    let normalized = run(
        "SELECT SUM(i.price) FROM items i \
         JOIN sales s ON s.uuid = i.sale_id AND s.sale_state = 'CLOSED' \
         WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s)",
        "item totals",
    )
    .unwrap();
    assert!(normalized.applied.is_empty());
}

fn assert_missing_completed_state(sql: &str) {
    assert!(
        matches!(
            run(sql, "total sales"),
            Err(NormalizeError::MissingRequiredFilter { ref table, .. }) if table == "sales"
        ),
        "{}",
        sql
    );
}

#[test]
fn test_negated_completed_state_is_rejected() {
    assert_missing_completed_state(
        "SELECT SUM(total) FROM sales WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
         AND NOT (sale_state = 'CLOSED')",
    );
}

#[test]
fn test_completed_state_inside_or_is_rejected() {
    assert_missing_completed_state(
        "SELECT SUM(total) FROM sales WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
         AND (sale_state = 'CLOSED' OR TRUE)",
    );
}

#[test]
fn test_every_block_reading_sales_needs_completed_state() {
    assert_missing_completed_state(
        "SELECT SUM(total) FROM sales WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
         AND sale_state = 'CLOSED' \
         AND uuid NOT IN (SELECT uuid FROM sales WHERE total > 100)",
    );
}

#[test]
fn test_parenthesized_completed_state_counts() {
    let normalized = run(
        "SELECT SUM(total) FROM sales WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
         AND (sale_state = 'CLOSED')",
        "total sales",
    )
    .unwrap();
    assert!(normalized.applied.is_empty());
}

#[test]
fn test_scope_and_state_inside_cte() {
    let normalized = run(
        "WITH r AS (SELECT uuid, total FROM sales \
         WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND sale_state = 'CLOSED') \
         SELECT SUM(total) FROM r",
        "total sales",
    )
    .unwrap();
    assert!(normalized.applied.is_empty());
    assert!(normalized.sql.starts_with("WITH r AS (\n"));
    assert!(normalized.sql.contains("LOWER(restaurant) = LOWER(%(restaurant)s)"));
}

#[test]
fn test_tables_without_completed_state_pass() {
    let normalized = run(
        "SELECT SUM(amount) FROM expenses WHERE LOWER(restaurant) = LOWER(%(restaurant)s)",
        "expenses",
    )
    .unwrap();
    assert!(normalized.applied.is_empty());
}

#[test]
fn test_fetch_is_unsupported() {
    let err = run(
        "SELECT total FROM sales WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
         AND sale_state = 'CLOSED' FETCH FIRST 5 ROWS ONLY",
        "top sales",
    )
    .unwrap_err();
    assert!(matches!(err, NormalizeError::Unsupported(_)));
}

// =============================================================================
// Rewrites
// =============================================================================

#[test]
fn test_relative_week_replaces_date_window() {
    let normalized = run(
        "SELECT SUM(total) AS revenue FROM sales \
         WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND sale_state = 'CLOSED' \
         AND created_at >= NOW() - INTERVAL '7 days'",
        "What were sales last week?",
    )
    .unwrap();

    assert_eq!(normalized.applied, vec!["relative_week"]);
    insta::assert_snapshot!(normalized.sql, @r"
    SELECT
      SUM(total) AS revenue
    FROM sales
    WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND sale_state = 'CLOSED' AND sales.created_at >= DATE '2024-01-01' AND sales.created_at < DATE '2024-01-08'
    ");
}

#[test]
fn test_relative_week_reports_no_change_on_current_window() {
    let question = "What were sales last week?";
    let first = run(
        "SELECT SUM(total) AS revenue FROM sales \
         WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND sale_state = 'CLOSED' \
         AND created_at >= '2023-12-01'",
        question,
    )
    .unwrap();
    assert_eq!(first.applied, vec!["relative_week"]);

    let second = run(&first.sql, question).unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.sql, first.sql);
}

#[test]
fn test_relative_week_on_payments() {
    let normalized = run(
        "SELECT SUM(amount) FROM payments \
         WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND created_at >= '2023-01-01'",
        "Payments in the LAST FULL WEEK",
    )
    .unwrap();

    assert_eq!(normalized.applied, vec!["relative_week"]);
    assert!(normalized.sql.ends_with(
        "WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
         AND payments.created_at >= DATE '2024-01-01' AND payments.created_at < DATE '2024-01-08'"
    ));
}

#[test]
fn test_relative_week_needs_the_phrase() {
    let normalized = run(
        "SELECT SUM(total) FROM sales \
         WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND sale_state = 'CLOSED' \
         AND created_at >= '2024-01-01'",
        "sales this month",
    )
    .unwrap();
    assert!(normalized.applied.is_empty());
    assert!(normalized.sql.contains("created_at >= '2024-01-01'"));
}

#[test]
fn test_banned_column_keeps_alias() {
    let normalized = run(
        "SELECT SUM(s.total) AS revenue FROM sales s \
         WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s) AND s.sale_state = 'CLOSED' \
         AND s.closed_at >= '2024-01-01'",
        "revenue since new year",
    )
    .unwrap();

    assert_eq!(normalized.applied, vec!["banned_column"]);
    insta::assert_snapshot!(normalized.sql, @r"
    SELECT
      SUM(s.total) AS revenue
    FROM sales AS s
    WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s) AND s.sale_state = 'CLOSED' AND s.created_at >= '2024-01-01'
    ");
}

#[test]
fn test_banned_column_on_other_table_is_untouched() {
    let normalized = run(
        "SELECT SUM(amount) FROM expenses \
         WHERE LOWER(restaurant) = LOWER(%(restaurant)s) AND closed_at IS NULL",
        "open expenses",
    )
    .unwrap();
    assert!(normalized.applied.is_empty());
    assert!(normalized.sql.contains("closed_at IS NULL"));
}

#[test]
fn test_product_revenue_canonicalization() {
    let normalized = run(
        "SELECT SUM(s.total) AS revenue FROM sales s \
         JOIN items i ON i.sale_id = s.uuid \
         JOIN products p ON p.uuid = i.product_id \
         WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s) AND s.sale_state = 'CLOSED' \
         AND p.name = 'Margherita'",
        "How much did Margherita make?",
    )
    .unwrap();

    assert_eq!(normalized.applied, vec!["product_revenue"]);
    insta::assert_snapshot!(normalized.sql, @r"
    SELECT
      COALESCE(SUM(i.price * i.quantity), 0) AS revenue
    FROM sales AS s
    INNER JOIN items AS i ON i.sale_id = s.uuid
    INNER JOIN products AS p ON p.uuid = i.product_id
    WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s) AND s.sale_state = 'CLOSED' AND p.name ILIKE 'Margherita' AND i.canceled IS NOT TRUE
    ");
}

#[test]
fn test_product_revenue_keeps_existing_cancel_filter() {
    let normalized = run(
        "SELECT SUM(i.price * i.quantity) FROM items i \
         JOIN sales s ON s.uuid = i.sale_id \
         JOIN products p ON p.uuid = i.product_id \
         WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s) AND s.sale_state = 'CLOSED' \
         AND i.canceled = FALSE AND 'Margherita' = p.name",
        "Margherita revenue",
    )
    .unwrap();

    assert_eq!(normalized.sql.matches("i.canceled").count(), 1);
    assert!(normalized.sql.contains("p.name ILIKE 'Margherita'"));
    assert!(normalized
        .sql
        .contains("COALESCE(SUM(i.price * i.quantity), 0)"));
}

#[test]
fn test_rewrites_are_idempotent() {
    let question = "How much did Margherita make last week?";
    let first = run(
        "SELECT SUM(s.total) AS revenue FROM sales s \
         JOIN items i ON i.sale_id = s.uuid \
         JOIN products p ON p.uuid = i.product_id \
         WHERE LOWER(s.restaurant) = LOWER(%(restaurant)s) AND s.sale_state = 'CLOSED' \
         AND s.closed_at >= '2024-01-01' AND p.name = 'Margherita'",
        question,
    )
    .unwrap();
    assert_eq!(
        first.applied,
        vec!["relative_week", "product_revenue"]
    );

    let second = run(&first.sql, question).unwrap();
    assert_eq!(second.sql, first.sql);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_rules_must_match_catalog() {
    let catalog = restaurant_catalog().unwrap();

    let mut rules = NormalizerRules::default();
    rules.product_revenue.gross_metric = "net_sales".into();
    assert_eq!(
        Normalizer::new(&catalog, "restaurant", &rules).unwrap_err(),
        LookupError::UnknownMetric("net_sales".into())
    );

    let mut rules = NormalizerRules::default();
    rules.relative_week_tables = vec!["orders".into()];
    assert_eq!(
        Normalizer::new(&catalog, "restaurant", &rules).unwrap_err(),
        LookupError::UnknownTable("orders".into())
    );
}

/// Caps unbounded statements at a fixed row count.
struct RowCap(u64);

impl NormalizerPass for RowCap {
    fn name(&self) -> &'static str {
        "row_cap"
    }

    fn apply(&self, query: &mut Query, _ctx: &PassContext<'_>) -> NormalizeResult<bool> {
        if query.limit_offset.as_ref().is_some_and(|l| l.limit.is_some()) {
            return Ok(false);
        }
        query.limit_offset = Some(LimitOffset {
            limit: Some(self.0),
            offset: None,
        });
        Ok(true)
    }
}

#[test]
fn test_custom_pass_chain() {
    let normalizer =
        Normalizer::from_passes(vec![Box::new(ScopePass::new("tenant")), Box::new(RowCap(100))]);
    assert_eq!(normalizer.pass_names(), vec!["scope", "row_cap"]);

    let safe = validate_select_only("SELECT * FROM sales WHERE restaurant = %(tenant)s").unwrap();
    let normalized = normalizer.normalize(&safe, "everything").unwrap();
    assert_eq!(normalized.applied, vec!["row_cap"]);
    assert!(normalized.sql.ends_with("WHERE restaurant = %(tenant)s\nLIMIT 100"));

    let safe = validate_select_only("SELECT * FROM sales WHERE restaurant = %(restaurant)s").unwrap();
    assert!(matches!(
        normalizer.normalize(&safe, "everything"),
        Err(NormalizeError::MissingScopeParam { .. })
    ));
}
