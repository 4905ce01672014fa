use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Connection,
    Query,
    Migration,
    NotFound,
    NotAuthenticated,
    InvalidData,
}

/// Failure of any backing-store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: i64 },
    #[error("no user is signed in")]
    NotAuthenticated,
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::Connection,
            Self::Query(_) => ErrorCode::Query,
            Self::Migration(_) => ErrorCode::Migration,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::NotAuthenticated => ErrorCode::NotAuthenticated,
            Self::InvalidData(_) => ErrorCode::InvalidData,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_entity_and_id() {
        let err = StoreError::NotFound {
            entity: "customer",
            id: 9,
        };
        assert_eq!(err.to_string(), "customer 9 does not exist");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!err.is_connection());
    }

    #[test]
    fn error_codes_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NotAuthenticated).expect("serialize");
        assert_eq!(json, "\"not_authenticated\"");
    }
}
