// tests/compile/standard_compile_test.rs
use chrono::NaiveDate;
use querygate::compile::{compile, CompileError, CompileOptions, ParamValue};
use querygate::plan::{Dimension, QueryPlan, TimeGrain};
use querygate::schema::{parse_catalog, restaurant_catalog, Catalog};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn catalog() -> Catalog {
    restaurant_catalog().unwrap()
}

fn param_names(params: &std::collections::BTreeMap<String, ParamValue>) -> Vec<&str> {
    params.keys().map(String::as_str).collect()
}

#[test]
fn test_daily_gross_sales() {
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_date_range(date("2024-01-01"), date("2024-01-07"))
        .with_time_grain(TimeGrain::Day);

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    insta::assert_snapshot!(built.sql, @r"
    SELECT
      DATE_TRUNC('day', sales.created_at) AS period,
      SUM(sales.total) AS value
    FROM sales
    WHERE LOWER(sales.restaurant) = LOWER(%(restaurant)s) AND sales.sale_state = 'CLOSED' AND sales.created_at >= %(start_date)s::date AND sales.created_at < (%(end_date)s::date + INTERVAL '1 day')
    GROUP BY DATE_TRUNC('day', sales.created_at)
    ORDER BY period ASC
    ");

    assert_eq!(
        serde_json::to_value(&built.params).unwrap(),
        serde_json::json!({
            "end_date": "2024-01-07",
            "restaurant": "Cafe Roma",
            "start_date": "2024-01-01"
        })
    );
    assert!(!built.sql.contains("Cafe Roma"));
}

#[test]
fn test_top_products_by_item_revenue() {
    let plan = QueryPlan::new("item_revenue", "items", "Cafe Roma")
        .with_dimension(Dimension::new("products", "name").with_alias("product"))
        .with_limit(10);

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    insta::assert_snapshot!(built.sql, @r"
    SELECT
      products.name AS product,
      SUM(items.price * items.quantity) AS value
    FROM items
    LEFT JOIN products ON items.product_id = products.uuid
    INNER JOIN sales ON items.sale_id = sales.uuid
    WHERE LOWER(sales.restaurant) = LOWER(%(restaurant)s) AND sales.sale_state = 'CLOSED' AND items.canceled IS NOT TRUE
    GROUP BY products.name
    ORDER BY value DESC
    LIMIT 10
    ");
    assert_eq!(param_names(&built.params), vec!["restaurant"]);
}

#[test]
fn test_expenses_skip_completed_state() {
    let plan = QueryPlan::new("expense_total", "expenses", "Cafe Roma")
        .with_time_grain(TimeGrain::Week)
        .with_dimension(Dimension::new("expense_categories", "name"));

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    assert_eq!(
        built.sql,
        "SELECT\n  DATE_TRUNC('week', expenses.created_at) AS period,\n  \
         expense_categories.name AS expense_categories_name,\n  \
         SUM(expenses.amount) AS value\n\
         FROM expenses\n\
         LEFT JOIN expense_categories ON expenses.exp_category_id = expense_categories.uuid\n\
         WHERE LOWER(expenses.restaurant) = LOWER(%(restaurant)s) AND expenses.canceled IS NOT TRUE\n\
         GROUP BY DATE_TRUNC('week', expenses.created_at), expense_categories.name\n\
         ORDER BY period ASC"
    );
    assert!(!built.sql.contains("sale_state"));
}

#[test]
fn test_ungrouped_total_has_no_order() {
    let plan = QueryPlan::new("covers", "sales", "Cafe Roma");
    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    assert!(built.sql.ends_with(
        "WHERE LOWER(sales.restaurant) = LOWER(%(restaurant)s) AND sales.sale_state = 'CLOSED'"
    ));
    assert!(!built.sql.contains("GROUP BY"));
    assert!(!built.sql.contains("ORDER BY"));
}

#[test]
fn test_zero_limit_is_unset() {
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_dimension(Dimension::new("sales", "table_name"))
        .with_limit(0);
    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();
    assert!(!built.sql.contains("LIMIT"));
    assert!(!built.sql.contains("ORDER BY"));
}

#[test]
fn test_day_comparison_picks_two_days() {
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_time_grain(TimeGrain::Day)
        .with_comparison(vec![date("2024-03-01"), date("2024-02-23")], None);

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    assert!(built.sql.contains(
        "AND DATE(sales.created_at) IN (%(cmp_date_1)s::date, %(cmp_date_2)s::date)"
    ));
    assert_eq!(
        built.params.get("cmp_date_2"),
        Some(&ParamValue::Date(date("2024-02-23")))
    );
}

#[test]
fn test_month_to_date_comparison() {
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_time_grain(TimeGrain::Month)
        .with_comparison(
            vec![date("2024-02-01"), date("2024-01-01")],
            Some(vec![date("2024-02-10"), date("2024-01-10")]),
        );

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    assert!(built.sql.contains(
        "DATE_TRUNC('month', sales.created_at) IN (%(cmp_start_1)s::date, %(cmp_start_2)s::date) \
         AND ((sales.created_at >= %(cmp_start_1)s::date AND sales.created_at < (%(cmp_end_1)s::date + INTERVAL '1 day')) \
         OR (sales.created_at >= %(cmp_start_2)s::date AND sales.created_at < (%(cmp_end_2)s::date + INTERVAL '1 day')))"
    ));
    assert_eq!(
        param_names(&built.params),
        vec!["cmp_end_1", "cmp_end_2", "cmp_start_1", "cmp_start_2", "restaurant"]
    );
}

#[test]
fn test_week_comparison_ignores_end_dates() {
    let plan = QueryPlan::new("payment_total", "payments", "Cafe Roma")
        .with_time_grain(TimeGrain::Week)
        .with_comparison(
            vec![date("2024-03-04"), date("2024-02-26")],
            Some(vec![date("2024-03-06"), date("2024-02-28")]),
        );

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();

    assert!(built.sql.contains(
        "DATE_TRUNC('week', payments.created_at) IN (%(cmp_start_1)s::date, %(cmp_start_2)s::date)"
    ));
    assert!(!built.sql.contains("cmp_end"));
    assert_eq!(
        param_names(&built.params),
        vec!["cmp_start_1", "cmp_start_2", "restaurant"]
    );
}

#[test]
fn test_open_ended_date_range() {
    let mut plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma");
    plan.date_range = Some(querygate::plan::DateRange {
        start: Some(date("2024-01-01")),
        end: None,
    });

    let built = compile(&plan, &catalog(), &CompileOptions::default()).unwrap();
    assert!(built.sql.contains("sales.created_at >= %(start_date)s::date"));
    assert!(!built.sql.contains("end_date"));
    assert_eq!(param_names(&built.params), vec!["restaurant", "start_date"]);
}

#[test]
fn test_custom_tenant_param() {
    let options = CompileOptions::default().with_tenant_param("tenant");
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma");

    let built = compile(&plan, &catalog(), &options).unwrap();
    assert!(built.sql.contains("LOWER(sales.restaurant) = LOWER(%(tenant)s)"));
    assert_eq!(
        built.params.get("tenant"),
        Some(&ParamValue::Text("Cafe Roma".into()))
    );
}

#[test]
fn test_compile_is_deterministic() {
    let catalog = catalog();
    let plan = QueryPlan::new("item_revenue", "items", "Cafe Roma")
        .with_dimension(Dimension::new("product_categories", "name"))
        .with_dimension(Dimension::new("products", "name"))
        .with_time_grain(TimeGrain::Month);

    let first = compile(&plan, &catalog, &CompileOptions::default()).unwrap();
    for _ in 0..5 {
        assert_eq!(compile(&plan, &catalog, &CompileOptions::default()).unwrap(), first);
    }
}

#[test]
fn test_plan_from_json() {
    let plan = QueryPlan::from_json(
        r#"{
            "metric": "gross_sales",
            "base_table": "sales",
            "restaurant": "Cafe Roma",
            "date_range": {"start": "2024-01-01", "end": "2024-01-07"},
            "time_grain": "day"
        }"#,
    )
    .unwrap();
    let from_builder = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_date_range(date("2024-01-01"), date("2024-01-07"))
        .with_time_grain(TimeGrain::Day);

    let options = CompileOptions::default();
    assert_eq!(
        compile(&plan, &catalog(), &options).unwrap(),
        compile(&from_builder, &catalog(), &options).unwrap()
    );
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_unknown_metric_and_table() {
    let options = CompileOptions::default();

    let plan = QueryPlan::new("net_profit", "sales", "Cafe Roma");
    assert_eq!(
        compile(&plan, &catalog(), &options).unwrap_err(),
        CompileError::UnknownMetric("net_profit".into())
    );

    let plan = QueryPlan::new("gross_sales", "customers", "Cafe Roma");
    assert_eq!(
        compile(&plan, &catalog(), &options).unwrap_err(),
        CompileError::UnknownTable("customers".into())
    );

    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_dimension(Dimension::new("customers", "name"));
    assert_eq!(
        compile(&plan, &catalog(), &options).unwrap_err(),
        CompileError::UnknownTable("customers".into())
    );
}

#[test]
fn test_invalid_plans() {
    let options = CompileOptions::default();

    let plan = QueryPlan::new("gross_sales", "sales", "  ");
    assert_eq!(
        compile(&plan, &catalog(), &options).unwrap_err(),
        CompileError::MissingTenant
    );

    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_date_range(date("2024-02-01"), date("2024-01-01"));
    assert!(matches!(
        compile(&plan, &catalog(), &options),
        Err(CompileError::InvalidDateRange { .. })
    ));

    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma").with_comparison(
        vec![date("2024-01-01"), date("2024-01-08"), date("2024-01-15")],
        None,
    );
    assert!(matches!(
        compile(&plan, &catalog(), &options),
        Err(CompileError::InvalidComparisonSpec { .. })
    ));
}

const ISLAND_CATALOG: &str = r#"
[[tables]]
name = "sales"
role = "fact"
scope_column = "restaurant"
date_column = "created_at"

[[tables]]
name = "regions"
role = "dimension"

[[tables]]
name = "menus"
role = "dimension"
scope_column = "restaurant"

[[metrics]]
key = "gross_sales"
base_table = "sales"
expression = "SUM(sales.total)"

[[metrics]]
key = "menu_price"
base_table = "menus"
expression = "SUM(menus.price)"
"#;

#[test]
fn test_unreachable_dimension() {
    let catalog = parse_catalog(ISLAND_CATALOG).unwrap();
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma")
        .with_dimension(Dimension::new("regions", "name"));

    assert_eq!(
        compile(&plan, &catalog, &CompileOptions::default()).unwrap_err(),
        CompileError::NoJoinPath {
            from: "sales".into(),
            to: "regions".into()
        }
    );
}

#[test]
fn test_metric_without_date_column() {
    let catalog = parse_catalog(ISLAND_CATALOG).unwrap();
    let plan = QueryPlan::new("menu_price", "menus", "Cafe Roma");

    assert_eq!(
        compile(&plan, &catalog, &CompileOptions::default()).unwrap_err(),
        CompileError::MissingDateColumn {
            table: "menus".into()
        }
    );
}

#[test]
fn test_unscoped_base_table() {
    let catalog = parse_catalog(
        r#"
[[tables]]
name = "sales"
role = "fact"
date_column = "created_at"

[[metrics]]
key = "gross_sales"
base_table = "sales"
expression = "SUM(sales.total)"
"#,
    )
    .unwrap();
    let plan = QueryPlan::new("gross_sales", "sales", "Cafe Roma");

    assert_eq!(
        compile(&plan, &catalog, &CompileOptions::default()).unwrap_err(),
        CompileError::MissingScopeColumn {
            table: "sales".into()
        }
    );
}
