//! Integration tests for dialect rewriting.
//!
//! These tests verify:
//! - Order expansion and parsing across input kinds
//! - Order deduplication between column references and parsed strings
//! - Lock hint selection per dialect
//! - SELECT rendering with pagination and lock hints

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlserver_adapter::arel::{
    ArelError, ColumnRef, Dialect, DialectRewriter, LockIntent, NamedEngine, OrderInput,
    OrderNode, OrderSpec, Relation, SelectManager, SqlLiteral, dedup_orders, expand_orders,
    parse_order_text,
};

fn sqlserver() -> DialectRewriter {
    DialectRewriter::for_engine(&NamedEngine::sqlserver())
}

fn postgres() -> DialectRewriter {
    DialectRewriter::for_engine(&NamedEngine::new("PostgreSQLAdapter"))
}

fn specs(nodes: &[OrderNode]) -> Vec<OrderSpec> {
    nodes
        .iter()
        .map(|node| node.as_spec().cloned().expect("expanded order"))
        .collect()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_function_call_with_comma_stays_whole() {
    assert_eq!(
        parse_order_text("name ASC, UPPER(a,b) DESC, age"),
        vec![
            OrderSpec::asc(SqlLiteral::new("name")),
            OrderSpec::desc(SqlLiteral::new("UPPER(a,b)")),
            OrderSpec::asc(SqlLiteral::new("age")),
        ]
    );
}

#[test]
fn test_mixed_inputs_expand_in_order() {
    let users = Relation::new("users").aliased("u");
    let inputs: Vec<OrderInput> = vec![
        users.column("email").into(),
        OrderSpec::desc(SqlLiteral::new("created_at")).into(),
        "id desc, name".into(),
        OrderInput::display(42),
    ];
    let nodes = sqlserver().rewrite_order(&[], inputs);

    assert_eq!(
        specs(&nodes),
        vec![
            OrderSpec::asc(ColumnRef::new("u", "email")),
            OrderSpec::desc(SqlLiteral::new("created_at")),
            OrderSpec::desc(SqlLiteral::new("id")),
            OrderSpec::asc(SqlLiteral::new("name")),
            OrderSpec::asc(SqlLiteral::new("42")),
        ]
    );
}

#[test]
fn test_rewrite_appends_to_existing_orders() {
    let rewriter = sqlserver();
    let first = rewriter.rewrite_order(&[], ["a"]);
    let second = rewriter.rewrite_order(&first, ["b DESC"]);
    assert_eq!(
        specs(&second),
        vec![
            OrderSpec::asc(SqlLiteral::new("a")),
            OrderSpec::desc(SqlLiteral::new("b")),
        ]
    );
}

#[test]
fn test_generic_engine_passes_orders_through() {
    let nodes = postgres().rewrite_order(&[], ["name ASC, UPPER(a,b) DESC"]);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].to_sql(Dialect::Generic), "name ASC, UPPER(a,b) DESC");
}

#[test]
fn test_column_and_parsed_string_dedup() {
    let users = Relation::new("users");
    let mut orders = expand_orders([users.column("name")]);
    orders.extend(parse_order_text("users.name ASC, [users].[name], users.name DESC"));

    assert_eq!(
        dedup_orders(orders),
        vec![
            OrderSpec::asc(ColumnRef::new("users", "name")),
            OrderSpec::desc(SqlLiteral::new("users.name")),
        ]
    );
}

// ============================================================================
// Locking
// ============================================================================

#[test]
fn test_lock_true_per_dialect() {
    assert_eq!(
        sqlserver().rewrite_lock(true).as_deref(),
        Some("WITH (HOLDLOCK, ROWLOCK)")
    );
    assert_eq!(postgres().rewrite_lock(true).as_deref(), Some("FOR UPDATE"));
    assert_eq!(sqlserver().rewrite_lock(false), None);
}

#[test]
fn test_custom_lock_hints() {
    let rewriter = sqlserver();
    assert_eq!(
        rewriter.lock_intent(SqlLiteral::new("WITH (NOLOCK)")),
        LockIntent::CustomLock("WITH (NOLOCK)".into())
    );
    assert_eq!(
        rewriter.rewrite_lock("WITH (TABLOCKX)").as_deref(),
        Some("WITH (TABLOCKX)")
    );
    assert_eq!(
        rewriter.rewrite_lock("for update").as_deref(),
        Some("WITH (UPDLOCK)")
    );
}

#[test]
fn test_detection_is_exact_and_per_call() {
    assert_eq!(
        DialectRewriter::for_engine(&NamedEngine::new("sqlserveradapter")).dialect(),
        Dialect::Generic
    );
    assert_eq!(
        DialectRewriter::for_engine(&NamedEngine::disconnected()).dialect(),
        Dialect::Generic
    );

    let err = DialectRewriter::sqlserver(&NamedEngine::new("Mysql2Adapter")).unwrap_err();
    assert!(matches!(err, ArelError::DialectMismatch { .. }));
    assert!(err.to_string().contains("Mysql2Adapter"));
}

// ============================================================================
// SELECT rendering
// ============================================================================

#[test]
fn test_paginated_locked_select() {
    let users = Relation::new("users");
    let mut query = SelectManager::new(Arc::new(NamedEngine::sqlserver()), users.clone());
    query
        .project(["id", "name"])
        .filter("active = 1")
        .order([users.column("name")])
        .order(["id DESC"])
        .lock(true)
        .skip(40)
        .take(20);

    assert_eq!(
        query.to_sqlserver_sql().unwrap(),
        "SELECT id, name FROM [users] WITH (HOLDLOCK, ROWLOCK) WHERE active = 1 \
         ORDER BY [users].[name] ASC, id DESC OFFSET 40 ROWS FETCH NEXT 20 ROWS ONLY"
    );
}

#[test]
fn test_same_builder_renders_generic_elsewhere() {
    let mut query = SelectManager::new(
        Arc::new(NamedEngine::new("PostgreSQLAdapter")),
        Relation::new("users"),
    );
    query.order(["name"]).lock(true).take(1);

    assert_eq!(
        query.to_sql(),
        "SELECT * FROM \"users\" ORDER BY name LIMIT 1 FOR UPDATE"
    );
    assert!(query.to_sqlserver_sql().is_err());
}
