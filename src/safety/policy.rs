//! What the Safety Gate forbids beyond statement kinds.

use std::collections::BTreeSet;
use std::fmt;

use crate::schema::SchemaGraph;

/// A mutating, schema-altering or otherwise side-effecting operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Merge,
    Create,
    Alter,
    Drop,
    Truncate,
    Grant,
    Revoke,
    Copy,
    /// `SELECT ... INTO new_table`
    SelectInto,
    /// `FOR UPDATE` / `FOR SHARE`
    LockingRead,
    /// Call to a denylisted function.
    Function(String),
    /// Any other statement, by leading keyword.
    Command(String),
}

impl Operation {
    /// Classify a statement by its leading keyword.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_uppercase().as_str() {
            "INSERT" => Operation::Insert,
            "UPDATE" => Operation::Update,
            "DELETE" => Operation::Delete,
            "MERGE" => Operation::Merge,
            "CREATE" => Operation::Create,
            "ALTER" => Operation::Alter,
            "DROP" => Operation::Drop,
            "TRUNCATE" => Operation::Truncate,
            "GRANT" => Operation::Grant,
            "REVOKE" => Operation::Revoke,
            "COPY" => Operation::Copy,
            other => Operation::Command(other.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "INSERT"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Merge => write!(f, "MERGE"),
            Operation::Create => write!(f, "CREATE"),
            Operation::Alter => write!(f, "ALTER"),
            Operation::Drop => write!(f, "DROP"),
            Operation::Truncate => write!(f, "TRUNCATE"),
            Operation::Grant => write!(f, "GRANT"),
            Operation::Revoke => write!(f, "REVOKE"),
            Operation::Copy => write!(f, "COPY"),
            Operation::SelectInto => write!(f, "SELECT INTO"),
            Operation::LockingRead => write!(f, "locking read"),
            Operation::Function(name) => write!(f, "function {}", name),
            Operation::Command(keyword) => write!(f, "command {}", keyword),
        }
    }
}

pub const DEFAULT_FORBIDDEN_FUNCTIONS: &[&str] = &[
    "dblink",
    "dblink_exec",
    "lo_export",
    "lo_import",
    "nextval",
    "pg_advisory_lock",
    "pg_cancel_backend",
    "pg_ls_dir",
    "pg_read_binary_file",
    "pg_read_file",
    "pg_reload_conf",
    "pg_sleep",
    "pg_terminate_backend",
    "set_config",
    "setval",
];

/// Relation and function rules applied while walking a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyPolicy {
    /// Schemas a qualified relation may name. Unqualified names always pass.
    pub allowed_schemas: BTreeSet<String>,
    /// Lowercase function names that are never allowed.
    pub forbidden_functions: BTreeSet<String>,
    /// When set, relations must be one of these tables or a CTE name.
    pub known_tables: Option<BTreeSet<String>>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            allowed_schemas: BTreeSet::from(["public".to_string()]),
            forbidden_functions: DEFAULT_FORBIDDEN_FUNCTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            known_tables: None,
        }
    }
}

impl SafetyPolicy {
    /// Restrict relations to the tables of `schema`.
    pub fn for_schema(schema: &SchemaGraph) -> Self {
        Self::default().restrict_to(schema)
    }

    pub fn restrict_to(mut self, schema: &SchemaGraph) -> Self {
        self.known_tables = Some(schema.tables().map(|t| t.name.clone()).collect());
        self
    }

    pub fn with_allowed_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_schemas = schemas.into_iter().map(|s| s.into().to_lowercase()).collect();
        self
    }

    pub fn with_forbidden_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_functions = functions
            .into_iter()
            .map(|s| s.into().to_lowercase())
            .collect();
        self
    }

    pub fn forbids_function(&self, name: &str) -> bool {
        self.forbidden_functions.contains(&name.to_lowercase())
    }

    /// Whether a relation (`[schema.]table`, already lowercased) may be read.
    pub fn allows_relation(&self, parts: &[String], ctes: &BTreeSet<String>) -> bool {
        let Some((table, qualifiers)) = parts.split_last() else {
            return false;
        };
        if let Some(schema) = qualifiers.last() {
            if !self.allowed_schemas.contains(schema) {
                return false;
            }
        } else if ctes.contains(table) {
            return true;
        }
        match &self.known_tables {
            Some(known) => known.contains(table),
            None => true,
        }
    }
}
