// tests/compile/join_resolver_test.rs
use std::collections::BTreeSet;

use querygate::compile::{CompileError, JoinResolver};
use querygate::schema::{restaurant_catalog, JoinEdge, JoinKind, SchemaGraph, TableSpec};
use querygate::sql::Postgres;

fn required(tables: &[&str]) -> BTreeSet<String> {
    tables.iter().map(|t| t.to_string()).collect()
}

#[test]
fn test_expenses_reach_sales_through_payments() {
    let catalog = restaurant_catalog().unwrap();
    let resolver = JoinResolver::new(&catalog.schema);

    let path = resolver.find_path("expenses", "sales").unwrap();
    let edges = catalog.schema.edges();
    assert_eq!(path, vec![&edges[7], &edges[5], &edges[4]]);

    let joins = resolver.emit("expenses", &path).unwrap();
    let summary: Vec<(&str, JoinKind)> = joins.iter().map(|j| (j.table.as_str(), j.kind)).collect();
    assert_eq!(
        summary,
        vec![
            ("payment_methods", JoinKind::Left),
            ("payments", JoinKind::Left),
            ("sales", JoinKind::Inner),
        ]
    );
    assert_eq!(
        joins[1].on.to_tokens().serialize(&Postgres),
        "payments.pay_method_id = payment_methods.uuid"
    );
}

#[test]
fn test_resolve_category_from_items() {
    let catalog = restaurant_catalog().unwrap();
    let resolver = JoinResolver::new(&catalog.schema);

    let joins = resolver
        .resolve("items", &required(&["items", "product_categories"]))
        .unwrap();
    let tables: Vec<&str> = joins.iter().map(|j| j.table.as_str()).collect();
    assert_eq!(tables, vec!["products", "product_categories"]);
    assert_eq!(
        joins[0].on.to_tokens().serialize(&Postgres),
        "items.product_id = products.uuid"
    );
}

#[test]
fn test_resolve_deduplicates_shared_prefix() {
    let catalog = restaurant_catalog().unwrap();
    let resolver = JoinResolver::new(&catalog.schema);

    let joins = resolver
        .resolve("items", &required(&["products", "product_categories", "sales"]))
        .unwrap();
    let tables: Vec<&str> = joins.iter().map(|j| j.table.as_str()).collect();
    assert_eq!(tables, vec!["products", "product_categories", "sales"]);
}

#[test]
fn test_base_only_needs_no_joins() {
    let catalog = restaurant_catalog().unwrap();
    let resolver = JoinResolver::new(&catalog.schema);
    assert!(resolver
        .resolve("sales", &required(&["sales"]))
        .unwrap()
        .is_empty());
}

#[test]
fn test_tie_break_follows_declaration_order() {
    // Two equal-length paths from a to d; the edge declared first wins.
    let schema = SchemaGraph::new(
        vec![
            TableSpec::fact("a"),
            TableSpec::dimension("b"),
            TableSpec::dimension("c"),
            TableSpec::dimension("d"),
        ],
        vec![
            JoinEdge::new("a", "b_id", "b", "id", JoinKind::Inner),
            JoinEdge::new("a", "c_id", "c", "id", JoinKind::Inner),
            JoinEdge::new("b", "d_id", "d", "id", JoinKind::Left),
            JoinEdge::new("c", "d_id", "d", "id", JoinKind::Left),
        ],
        None,
    )
    .unwrap();
    let resolver = JoinResolver::new(&schema);
    let edges = schema.edges();

    for _ in 0..10 {
        let path = resolver.find_path("a", "d").unwrap();
        assert_eq!(path, vec![&edges[0], &edges[2]]);
    }
}

#[test]
fn test_unknown_table_is_reported() {
    let catalog = restaurant_catalog().unwrap();
    let resolver = JoinResolver::new(&catalog.schema);
    assert_eq!(
        resolver.find_path("sales", "customers").unwrap_err(),
        CompileError::UnknownTable("customers".into())
    );
}
