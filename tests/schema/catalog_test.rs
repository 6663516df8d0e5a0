// tests/schema/catalog_test.rs
use querygate::schema::{
    load_catalog, parse_catalog, restaurant_catalog, CatalogError, JoinKind, LookupError,
    TableRole,
};
use querygate::sql::{param, Postgres};

const CATALOG_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/catalog/restaurant.toml");

#[test]
fn test_shipped_catalog_file_matches_builtin() {
    let builtin = restaurant_catalog().unwrap();
    let loaded = load_catalog(CATALOG_FILE).unwrap();

    let builtin_tables: Vec<_> = builtin.schema.tables().collect();
    let loaded_tables: Vec<_> = loaded.schema.tables().collect();
    assert_eq!(loaded_tables, builtin_tables);
    assert_eq!(loaded.schema.edges(), builtin.schema.edges());
    assert_eq!(
        loaded.schema.completed_state(),
        builtin.schema.completed_state()
    );

    let builtin_metrics: Vec<_> = builtin.metrics.iter().collect();
    let loaded_metrics: Vec<_> = loaded.metrics.iter().collect();
    assert_eq!(loaded_metrics, builtin_metrics);
}

#[test]
fn test_roles_and_special_columns() {
    let catalog = restaurant_catalog().unwrap();
    let schema = &catalog.schema;

    let items = schema.table("items").unwrap();
    assert_eq!(items.role, TableRole::Fact);
    assert_eq!(items.date_column, None);
    assert_eq!(items.anchor.as_deref(), Some("sales"));
    assert_eq!(items.cancel_column.as_deref(), Some("canceled"));

    let categories = schema.table("product_categories").unwrap();
    assert_eq!(categories.role, TableRole::Dimension);
    let hierarchy = categories.hierarchy.as_ref().unwrap();
    assert_eq!(hierarchy.parent, "parent_category_id");

    let (source, column) = schema.date_source("items").unwrap().unwrap();
    assert_eq!((source.name.as_str(), column), ("sales", "created_at"));
    assert_eq!(schema.date_source("products").unwrap(), None);
}

#[test]
fn test_default_filters_render() {
    let catalog = restaurant_catalog().unwrap();
    let filters = catalog
        .schema
        .default_filters("expenses", &param("restaurant"))
        .unwrap();
    let rendered: Vec<String> = filters
        .iter()
        .map(|f| f.to_tokens().serialize(&Postgres))
        .collect();

    assert_eq!(
        rendered,
        vec![
            "LOWER(expenses.restaurant) = LOWER(%(restaurant)s)",
            "expenses.canceled IS NOT TRUE",
        ]
    );
}

#[test]
fn test_self_join_edge_is_declared() {
    let catalog = restaurant_catalog().unwrap();
    let self_edges: Vec<_> = catalog
        .schema
        .edges()
        .iter()
        .filter(|e| e.left_table == e.right_table)
        .collect();
    assert_eq!(self_edges.len(), 1);
    assert_eq!(self_edges[0].left_table, "product_categories");
    assert_eq!(self_edges[0].kind, JoinKind::Left);
}

#[test]
fn test_metric_lookup() {
    let catalog = restaurant_catalog().unwrap();
    let metric = catalog.metrics.get("item_revenue").unwrap();
    assert_eq!(metric.base_table, "items");
    assert_eq!(
        metric.expression.to_tokens().serialize(&Postgres),
        "SUM(items.price * items.quantity)"
    );

    assert_eq!(
        catalog.metrics.get("net_profit").unwrap_err(),
        LookupError::UnknownMetric("net_profit".into())
    );
    assert_eq!(
        catalog.schema.table("customers").unwrap_err(),
        LookupError::UnknownTable("customers".into())
    );
}

#[test]
fn test_catalog_rejects_unknown_anchor() {
    let err = parse_catalog(
        r#"
[[tables]]
name = "items"
role = "fact"
anchor = "sales"
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::UnknownReference { ref owner, ref table } if owner == "items" && table == "sales"
    ));
}

#[test]
fn test_catalog_rejects_join_to_unknown_table() {
    let err = parse_catalog(
        r#"
[[tables]]
name = "sales"
role = "fact"

[[joins]]
left_table = "items"
left_key = "sale_id"
right_table = "sales"
right_key = "uuid"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidJoin { .. }));
}

#[test]
fn test_catalog_rejects_non_aggregate_metric() {
    let err = parse_catalog(
        r#"
[[tables]]
name = "sales"
role = "fact"

[[metrics]]
key = "total"
base_table = "sales"
expression = "sales.total"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidExpression { ref metric, .. } if metric == "total"));
}

#[test]
fn test_catalog_with_metric_filter() {
    let catalog = parse_catalog(
        r#"
[[tables]]
name = "sales"
role = "fact"
scope_column = "restaurant"
date_column = "created_at"

[[metrics]]
key = "takeaway_sales"
base_table = "sales"
expression = "SUM(sales.total)"
extra_filters = ["sales.order_type = 'TAKEAWAY'"]
"#,
    )
    .unwrap();

    let metric = catalog.metrics.get("takeaway_sales").unwrap();
    assert_eq!(metric.extra_filters.len(), 1);
    assert_eq!(
        metric.extra_filters[0].to_tokens().serialize(&Postgres),
        "sales.order_type = 'TAKEAWAY'"
    );
    assert_eq!(catalog.schema.completed_state(), None);
}
