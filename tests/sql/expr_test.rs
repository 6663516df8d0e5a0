// tests/sql/expr_test.rs
use querygate::sql::{
    case_when, coalesce, col, func, interval, join_conjunction, lit_int, lit_null, lit_str, param,
    paren, split_conjunction, sum, table_col, Cte, Expr, ExprExt, OrderByExpr, Postgres, Query,
    TableRef, TableSource,
};

fn render(expr: &Expr) -> String {
    expr.to_tokens().serialize(&Postgres)
}

#[test]
fn test_reserved_identifiers_are_quoted() {
    assert_eq!(render(&table_col("sales", "order")), "sales.\"order\"");
    assert_eq!(render(&table_col("Sales", "total")), "\"Sales\".total");
}

#[test]
fn test_function_names_render_upper_case() {
    let expr = func("date_trunc", vec![lit_str("week"), table_col("sales", "created_at")]);
    assert_eq!(render(&expr), "DATE_TRUNC('week', sales.created_at)");
}

#[test]
fn test_string_literal_escaping() {
    assert_eq!(render(&lit_str("Chef's special")), "'Chef''s special'");
}

#[test]
fn test_week_window_arithmetic() {
    let boundary = paren(table_col("bounds", "week_start_current").sub(interval("14 days")));
    let expr = table_col("s", "created_at").gte(boundary);
    assert_eq!(
        render(&expr),
        "s.created_at >= (bounds.week_start_current - INTERVAL '14 days')"
    );
}

#[test]
fn test_percent_change_expression() {
    let delta = col("recent_rev").sub(col("prior_rev"));
    let expr = case_when(
        vec![(col("prior_rev").eq(lit_int(0)), lit_null())],
        Some(paren(delta).div(col("prior_rev"))),
    );
    assert_eq!(
        render(&expr),
        "CASE WHEN prior_rev = 0 THEN NULL ELSE (recent_rev - prior_rev) / prior_rev END"
    );
}

#[test]
fn test_coalesce_of_aggregate() {
    let expr = coalesce(vec![sum(table_col("i", "price")), lit_int(0)]);
    assert_eq!(render(&expr), "COALESCE(SUM(i.price), 0)");
    assert!(!expr.is_aggregate());
    assert!(expr.contains_aggregate());
}

#[test]
fn test_in_list_of_cast_params() {
    let expr = func("DATE", vec![table_col("sales", "created_at")]).in_list(vec![
        param("cmp_date_1").cast_to("date"),
        param("cmp_date_2").cast_to("date"),
    ]);
    assert_eq!(
        render(&expr),
        "DATE(sales.created_at) IN (%(cmp_date_1)s::date, %(cmp_date_2)s::date)"
    );
}

#[test]
fn test_conjunction_round_trip_keeps_disjunction_grouped() {
    let pred = col("a")
        .eq(lit_int(1))
        .and(col("b").eq(lit_int(2)).or(col("c").eq(lit_int(3))));
    let parts = split_conjunction(pred);
    assert_eq!(parts.len(), 2);

    let joined = join_conjunction(parts).unwrap();
    assert_eq!(render(&joined), "a = 1 AND (b = 2 OR c = 3)");
}

#[test]
fn test_rewrite_counts_replacements() {
    let mut expr = table_col("s", "closed_at")
        .gte(lit_str("2024-01-01"))
        .and(table_col("s", "closed_at").lt(lit_str("2024-02-01")));
    let replaced = expr.rewrite(&mut |node| match node {
        Expr::Column { table, column } if column == "closed_at" => Some(Expr::Column {
            table: table.clone(),
            column: "created_at".into(),
        }),
        _ => None,
    });
    assert_eq!(replaced, 2);
    assert_eq!(
        render(&expr),
        "s.created_at >= '2024-01-01' AND s.created_at < '2024-02-01'"
    );
}

#[test]
fn test_query_layout() {
    let query = Query::new()
        .select(vec![
            table_col("products", "name").alias("product"),
            sum(table_col("items", "price")).alias("value"),
        ])
        .from(TableRef::new("items"))
        .left_join(
            TableRef::new("products"),
            table_col("items", "product_id").eq(table_col("products", "uuid")),
        )
        .filter(table_col("items", "canceled").is_not_true())
        .group_by(vec![table_col("products", "name")])
        .order_by(vec![OrderByExpr::desc(col("value"))])
        .limit(3);

    assert_eq!(
        query.to_sql(&Postgres),
        "SELECT\n  products.name AS product,\n  SUM(items.price) AS value\nFROM items\n\
         LEFT JOIN products ON items.product_id = products.uuid\n\
         WHERE items.canceled IS NOT TRUE\nGROUP BY products.name\nORDER BY value DESC\nLIMIT 3"
    );
}

#[test]
fn test_nested_queries_are_enumerated() {
    let inner = Query::new()
        .select(vec![col("uuid")])
        .from(TableRef::new("sales"));
    let derived = Query::new()
        .select(vec![col("sale_id")])
        .from(TableRef::new("items"));
    let query = Query::new()
        .with_cte(Cte::new("closed", inner))
        .select(vec![col("x")])
        .from(TableSource::Derived {
            query: Box::new(derived),
            alias: Some("t".into()),
        });

    assert_eq!(query.queries().len(), 3);
    assert!(query.reads_table("sales"));
    assert!(query.reads_table("items"));
    assert!(!query.reads_table("payments"));
}
