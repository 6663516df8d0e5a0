// tests/safety/safety_gate_test.rs
use querygate::safety::{validate_select_only, Operation, SafetyGate, SafetyPolicy, UnsafeSqlError};
use querygate::schema::restaurant_catalog;

fn forbidden(operation: Operation) -> Result<(), UnsafeSqlError> {
    Err(UnsafeSqlError::ForbiddenStatement { operation })
}

fn check(text: &str) -> Result<(), UnsafeSqlError> {
    validate_select_only(text).map(|_| ())
}

fn restricted_gate() -> SafetyGate {
    let catalog = restaurant_catalog().unwrap();
    SafetyGate::new(SafetyPolicy::for_schema(&catalog.schema))
}

#[test]
fn test_write_statements_are_forbidden() {
    assert_eq!(check("DROP TABLE sales"), forbidden(Operation::Drop));
    assert_eq!(
        check("INSERT INTO sales (uuid) VALUES ('x')"),
        forbidden(Operation::Insert)
    );
    assert_eq!(
        check("UPDATE sales SET total = 0 WHERE uuid = 'x'"),
        forbidden(Operation::Update)
    );
    assert_eq!(check("TRUNCATE TABLE items"), forbidden(Operation::Truncate));
    assert_eq!(
        check("GRANT SELECT ON sales TO analyst"),
        forbidden(Operation::Grant)
    );
}

#[test]
fn test_locking_read_is_forbidden() {
    assert_eq!(
        check("SELECT uuid FROM sales FOR UPDATE"),
        forbidden(Operation::LockingRead)
    );
}

#[test]
fn test_select_into_is_forbidden() {
    assert_eq!(
        check("SELECT * INTO backup FROM sales"),
        forbidden(Operation::SelectInto)
    );
}

#[test]
fn test_denylisted_functions() {
    assert_eq!(
        check("SELECT pg_sleep(10)"),
        forbidden(Operation::Function("pg_sleep".into()))
    );
    assert_eq!(
        check("SELECT total FROM sales WHERE uuid IN (SELECT PG_READ_FILE('/etc/passwd'))"),
        forbidden(Operation::Function("pg_read_file".into()))
    );
}

#[test]
fn test_custom_function_denylist() {
    let gate = SafetyGate::new(SafetyPolicy::default().with_forbidden_functions(["now"]));
    assert_eq!(
        gate.validate("SELECT NOW()").map(|_| ()),
        forbidden(Operation::Function("now".into()))
    );
    assert!(gate.validate("SELECT pg_sleep(1)").is_ok());
}

#[test]
fn test_system_schema_is_rejected() {
    assert_eq!(
        check("SELECT usename FROM pg_catalog.pg_user"),
        Err(UnsafeSqlError::DisallowedRelation {
            relation: "pg_catalog.pg_user".into()
        })
    );
    assert!(check("SELECT total FROM public.sales").is_ok());
}

#[test]
fn test_restricted_policy_limits_tables() {
    let gate = restricted_gate();

    assert_eq!(
        gate.validate("SELECT * FROM users").map(|_| ()),
        Err(UnsafeSqlError::DisallowedRelation {
            relation: "users".into()
        })
    );
    assert!(gate
        .validate("WITH recent AS (SELECT uuid FROM sales) SELECT COUNT(*) FROM recent")
        .is_ok());
    assert!(gate
        .validate("SELECT p.name FROM items i JOIN products p ON p.uuid = i.product_id")
        .is_ok());
}

#[test]
fn test_values_is_not_select() {
    assert_eq!(check("VALUES (1), (2)"), Err(UnsafeSqlError::NotSelect));
}

#[test]
fn test_parse_errors() {
    assert!(matches!(check("SELEC 1"), Err(UnsafeSqlError::ParseError(_))));
}

#[test]
fn test_accepted_select_keeps_text() {
    let result = validate_select_only(
        "\n  SELECT SUM(total) AS revenue FROM sales\n  WHERE LOWER(restaurant) = LOWER(%(restaurant)s)\n  LIMIT 5 ;\n",
    )
    .unwrap();
    assert_eq!(
        result.normalized_sql,
        "SELECT SUM(total) AS revenue FROM sales\n  WHERE LOWER(restaurant) = LOWER(%(restaurant)s)\n  LIMIT 5"
    );
    assert!(result.has_limit);
}

#[test]
fn test_error_messages() {
    let err = check("DELETE FROM sales").unwrap_err();
    assert_eq!(err.to_string(), "DELETE is not allowed");

    let err = check("SELECT pg_sleep(1)").unwrap_err();
    assert_eq!(err.to_string(), "function pg_sleep is not allowed");
}
