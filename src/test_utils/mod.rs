//! Helpers for integration tests against a throwaway database server.

/// Embedded `PostgreSQL` server lifecycle
#[cfg(feature = "test-utils-postgres")]
pub mod postgres;
