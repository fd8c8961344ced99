//! # ENC Error
//!
//! Every failure a request can run into. The `Display` text of each variant is
//! exactly what the client receives in `PluginError`.

use std::time::Duration;

use lib_common::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncError {
    /// A required request field is absent.
    #[error("{0}")]
    Validation(&'static str),

    #[error("Internal error: HTTP request type was not set")]
    MissingVerb,

    #[error("Internal error: Invalid HTTP request type for this plugin {0}")]
    UnknownVerb(String),

    /// The private database could not be opened.
    #[error("Store open error for '{location}'. {source}")]
    StoreOpen {
        location: String,
        #[source]
        source: DbError,
    },

    /// Creating a table or index failed.
    #[error("Migrating {object} failed: {source}")]
    Schema {
        object: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A read against the store failed.
    #[error("Store query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// The delete/insert sequence of a replace failed; the transaction is rolled back.
    #[error("Replacing classes for '{salt_id}' failed: {source}")]
    Mutation {
        salt_id: String,
        #[source]
        source: sqlx::Error,
    },

    /// The replace body is not the expected JSON document.
    #[error("Error decoding the POST data ({body}). Error decoding JSON ('{source}').")]
    BodyDecode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Marshal error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl EncError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            EncError::Validation(_) => "validation",
            EncError::MissingVerb | EncError::UnknownVerb(_) => "protocol",
            EncError::StoreOpen { .. } | EncError::Schema { .. } => "store_open",
            EncError::Query(_) => "store_query",
            EncError::Mutation { .. } => "store_mutation",
            EncError::BodyDecode { .. } => "validation",
            EncError::Serialization(_) => "serialization",
            EncError::DeadlineExceeded(_) => "deadline_exceeded",
        }
    }
}
