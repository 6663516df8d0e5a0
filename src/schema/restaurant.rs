//! Built-in catalog for the restaurant point-of-sale database.

use super::{
    Catalog, CatalogError, CompletedState, Hierarchy, JoinEdge, JoinKind, MetricCatalog, MetricDef,
    SchemaGraph, TableSpec,
};
use crate::sql::expr::{sum, table_col, ExprExt};

const SCOPE: &str = "restaurant";

/// Tables, joins and metrics of the restaurant reporting schema.
pub fn restaurant_catalog() -> Result<Catalog, CatalogError> {
    let tables = vec![
        // facts
        TableSpec::fact("sales").with_scope(SCOPE).with_date("created_at"),
        // line items carry no timestamp; dates and tenant come from the sale
        TableSpec::fact("items")
            .with_scope(SCOPE)
            .with_cancel("canceled")
            .with_anchor("sales"),
        TableSpec::fact("payments")
            .with_scope(SCOPE)
            .with_date("created_at")
            .with_cancel("canceled"),
        TableSpec::fact("expenses")
            .with_scope(SCOPE)
            .with_date("created_at")
            .with_cancel("canceled"),
        // dimensions
        TableSpec::dimension("products").with_scope(SCOPE),
        TableSpec::dimension("product_categories")
            .with_scope(SCOPE)
            .with_hierarchy(Hierarchy {
                id: "uuid".into(),
                parent: "parent_category_id".into(),
                label: "name".into(),
            }),
        TableSpec::dimension("payment_methods").with_scope(SCOPE),
        TableSpec::dimension("expense_categories").with_scope(SCOPE),
    ];

    // Declaration order is the path-search tie-break.
    let edges = vec![
        JoinEdge::new("items", "sale_id", "sales", "uuid", JoinKind::Inner),
        JoinEdge::new("items", "product_id", "products", "uuid", JoinKind::Left),
        JoinEdge::new("products", "category_id", "product_categories", "uuid", JoinKind::Left),
        JoinEdge::new(
            "product_categories",
            "parent_category_id",
            "product_categories",
            "uuid",
            JoinKind::Left,
        ),
        JoinEdge::new("payments", "sale_id", "sales", "uuid", JoinKind::Inner),
        JoinEdge::new("payments", "pay_method_id", "payment_methods", "uuid", JoinKind::Left),
        JoinEdge::new("expenses", "exp_category_id", "expense_categories", "uuid", JoinKind::Left),
        JoinEdge::new("expenses", "pay_method_id", "payment_methods", "uuid", JoinKind::Left),
    ];

    let completed = CompletedState {
        table: "sales".into(),
        column: "sale_state".into(),
        value: "CLOSED".into(),
    };

    let schema = SchemaGraph::new(tables, edges, Some(completed))?;

    let metrics = vec![
        MetricDef::new("gross_sales", "sales", sum(table_col("sales", "total")))
            .with_description("Total sales based on sales.total."),
        MetricDef::new(
            "item_revenue",
            "items",
            sum(table_col("items", "price").mul(table_col("items", "quantity"))),
        )
        .with_description("Line-item revenue, price times quantity, excluding canceled items."),
        MetricDef::new("covers", "sales", sum(table_col("sales", "num_customers")))
            .with_description("Guests served, from sales.num_customers."),
        MetricDef::new("expense_total", "expenses", sum(table_col("expenses", "amount")))
            .with_description("Operational expenses excluding canceled ones."),
        MetricDef::new("payment_total", "payments", sum(table_col("payments", "amount")))
            .with_description("Payments collected excluding canceled ones."),
    ];
    let metrics = MetricCatalog::new(metrics, &schema)?;

    Ok(Catalog { schema, metrics })
}
