// tests/sql/convert_test.rs
use querygate::sql::params::{mask, placeholder_names, unmask};
use querygate::sql::{
    parse_expr, parse_query, table_col, Expr, ExprExt, JoinType, ParseError, Postgres,
};

#[test]
fn test_select_renders_in_canonical_layout() {
    let query = parse_query(
        "select s.total from Sales s where s.sale_state = 'CLOSED' order by s.total desc limit 5",
    )
    .unwrap();

    assert_eq!(
        query.to_sql(&Postgres),
        "SELECT\n  s.total\nFROM sales AS s\nWHERE s.sale_state = 'CLOSED'\nORDER BY s.total DESC\nLIMIT 5"
    );
}

#[test]
fn test_placeholders_survive_conversion() {
    let text = "SELECT SUM(total) FROM sales WHERE LOWER(restaurant) = LOWER(%(restaurant)s) \
                AND created_at >= %(start_date)s";
    let query = parse_query(text).unwrap();

    assert!(query.references_param("restaurant"));
    assert!(query.references_param("start_date"));
    assert!(!query.references_param("end_date"));

    let rendered = query.to_sql(&Postgres);
    assert!(rendered.contains("LOWER(restaurant) = LOWER(%(restaurant)s)"));
    assert_eq!(
        placeholder_names(&rendered).into_iter().collect::<Vec<_>>(),
        vec!["restaurant", "start_date"]
    );
}

#[test]
fn test_mask_is_reversible() {
    let text = "SELECT %(restaurant)s, %(cmp_date_1)s";
    assert_ne!(mask(text), text);
    assert_eq!(unmask(&mask(text)), text);
}

#[test]
fn test_left_join_and_aliases() {
    let query = parse_query(
        "SELECT p.name FROM items i LEFT JOIN products p ON p.uuid = i.product_id",
    )
    .unwrap();

    let joins = &query.from[0].joins;
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].join_type, JoinType::Left);
    assert_eq!(query.qualifiers_for("products"), vec!["products", "p"]);
    assert_eq!(query.qualifiers_for("items"), vec!["items", "i"]);
    assert!(query.qualifiers_for("sales").is_empty());
}

#[test]
fn test_predicates_convert_to_typed_nodes() {
    let expr = parse_expr("items.canceled IS NOT TRUE").unwrap();
    assert_eq!(expr, table_col("items", "canceled").is_not_true());

    let expr = parse_expr("p.name ILIKE 'Margherita'").unwrap();
    assert_eq!(expr, table_col("p", "name").ilike("Margherita"));

    let expr = parse_expr("sales.created_at BETWEEN '2024-01-01' AND '2024-01-31'").unwrap();
    assert!(matches!(expr, Expr::Between { negated: false, .. }));
}

#[test]
fn test_nested_predicate_keeps_parentheses() {
    let expr = parse_expr("a = 1 AND (b = 2 OR c = 3)").unwrap();
    assert_eq!(
        expr.to_tokens().serialize(&Postgres),
        "a = 1 AND (b = 2 OR c = 3)"
    );
}

#[test]
fn test_union_is_a_set_operation() {
    let query = parse_query("SELECT uuid FROM sales UNION ALL SELECT uuid FROM payments").unwrap();
    assert!(query.set_op.is_some());
    assert!(query.reads_table("sales"));
    assert!(query.reads_table("payments"));
}

#[test]
fn test_schema_qualified_table() {
    let query = parse_query("SELECT total FROM public.sales").unwrap();
    let tables = query.named_tables();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].schema.as_deref(), Some("public"));
    assert_eq!(tables[0].table, "sales");
}

#[test]
fn test_syntax_errors_are_reported() {
    assert!(matches!(parse_query("SELEC 1"), Err(ParseError::Syntax(_))));
    assert!(matches!(
        parse_query("SELECT 1; SELECT 2"),
        Err(ParseError::NotAQuery(_))
    ));
}

#[test]
fn test_locking_clause_is_unsupported() {
    let err = parse_query("SELECT total FROM sales FOR UPDATE").unwrap_err();
    assert!(matches!(err, ParseError::Unsupported(_)));
}
