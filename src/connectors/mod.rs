//! Source connectors: each implements [`Connector::get_documents`]
//! and is responsible only for producing [`Document`]s with the metadata
//! fields its connector type requires. Transport, auth, and pagination
//! details are connector-specific; the contract here is what the rest of
//! the pipeline depends on.

pub mod confluence;
pub mod git;
pub mod jira;
pub mod local_file;
pub mod publicdocs;

use async_trait::async_trait;

use crate::errors::ConnectorError;
use crate::models::Document;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance name as configured (e.g. the key under `sources.git`).
    fn name(&self) -> &str;

    /// Connector type identifier, used as the `source_type` prefix.
    fn connector_type(&self) -> &str;

    /// Source label documents from this instance are tagged with:
    /// `"{connector_type}:{name}"`.
    fn source_label(&self) -> String {
        format!("{}:{}", self.connector_type(), self.name())
    }

    async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    #[async_trait]
    impl Connector for Stub {
        fn name(&self) -> &str {
            "docs"
        }
        fn connector_type(&self) -> &str {
            "git"
        }
        async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError> {
            Ok(vec![])
        }
    }

    #[test]
    fn source_label_combines_type_and_name() {
        assert_eq!(Stub.source_label(), "git:docs");
    }
}
