//! # querygate
//!
//! SQL compiler and safety gateway for restaurant reporting.
//!
//! ## Architecture
//!
//! Two paths share one catalog:
//!
//! ```text
//! ┌──────────────────────┐          ┌──────────────────────────┐
//! │  QueryPlan (JSON)    │          │  external SQL + question │
//! └──────────────────────┘          └──────────────────────────┘
//!            │                                   │
//!            ▼ [compile]                         ▼ [safety]
//! ┌──────────────────────┐          ┌──────────────────────────┐
//! │ Join Resolver        │          │ Safety Gate              │
//! │ standard / trend     │          │ (single read-only SELECT)│
//! └──────────────────────┘          └──────────────────────────┘
//!            │                                   │
//!            │                                   ▼ [normalize]
//!            │                      ┌──────────────────────────┐
//!            │                      │ Normalizer pass chain    │
//!            │                      └──────────────────────────┘
//!            ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │      PostgreSQL text with %(name)s placeholders             │
//! └─────────────────────────────────────────────────────────────┘
//!            ▲                                   ▲
//!            └──────── Schema Graph + Metric Catalog ────────┘
//! ```
//!
//! [`gateway::Gateway`] wires both paths from [`config::Settings`].

pub mod compile;
pub mod config;
pub mod gateway;
pub mod normalize;
pub mod plan;
pub mod safety;
pub mod schema;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{compile, BuiltQuery, CompileError, CompileOptions, ParamValue};
    pub use crate::config::Settings;
    pub use crate::gateway::{CheckedSql, Gateway, GatewayError};
    pub use crate::normalize::{FixedClock, Normalized, Normalizer, NormalizerRules};
    pub use crate::plan::{DateRange, Dimension, QueryPlan, RankBy, TimeGrain, TrendSpec};
    pub use crate::safety::{validate_select_only, SafetyGate, SafetyPolicy, UnsafeSqlError};
    pub use crate::schema::{restaurant_catalog, Catalog, SchemaGraph};
    pub use crate::sql::{Postgres, Query};
}

pub use gateway::{Gateway, GatewayError};
