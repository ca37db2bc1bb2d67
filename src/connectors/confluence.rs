//! Confluence connector: identifies documents by space + page id.
//! Required metadata: space_key, page_id, version, labels, ancestors
//! (breadcrumb).

use serde::Deserialize;

use crate::config::ConfluenceSourceConfig;
use crate::errors::ConnectorError;
use crate::models::Document;

use super::Connector;

pub struct ConfluenceConnector {
    name: String,
    config: ConfluenceSourceConfig,
    project_id: String,
    client: reqwest::Client,
}

impl ConfluenceConnector {
    pub fn new(name: String, config: ConfluenceSourceConfig, project_id: String) -> Self {
        Self {
            name,
            config,
            project_id,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageListResponse {
    results: Vec<PageSummary>,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PageDetail {
    id: String,
    title: String,
    version: VersionInfo,
    body: BodyStorage,
    #[serde(default)]
    metadata: PageMetadata,
    #[serde(default)]
    ancestors: Vec<AncestorRef>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct BodyStorage {
    storage: StorageValue,
}

#[derive(Debug, Deserialize)]
struct StorageValue {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct PageMetadata {
    #[serde(default)]
    labels: LabelsWrapper,
}

#[derive(Debug, Default, Deserialize)]
struct LabelsWrapper {
    #[serde(default)]
    results: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AncestorRef {
    title: String,
}

#[async_trait::async_trait]
impl Connector for ConfluenceConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "confluence"
    }

    async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError> {
        let page_ids = self.list_page_ids().await?;
        let mut documents = Vec::with_capacity(page_ids.len());
        for page_id in page_ids {
            documents.push(self.fetch_page(&page_id).await?);
        }
        Ok(documents)
    }
}

impl ConfluenceConnector {
    async fn list_page_ids(&self) -> Result<Vec<String>, ConnectorError> {
        let url = format!(
            "{}/rest/api/content?spaceKey={}&limit=200",
            self.config.base_url.trim_end_matches('/'),
            self.config.space_key
        );
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ConnectorError::Unreachable {
                connector: self.source_label(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| ConnectorError::Unreachable {
                connector: self.source_label(),
                message: e.to_string(),
            })?
            .json::<PageListResponse>()
            .await
            .map_err(|e| ConnectorError::Unreachable {
                connector: self.source_label(),
                message: e.to_string(),
            })?;
        Ok(response.results.into_iter().map(|p| p.id).collect())
    }

    async fn fetch_page(&self, page_id: &str) -> Result<Document, ConnectorError> {
        let url = format!(
            "{}/rest/api/content/{}?expand=body.storage,version,metadata.labels,ancestors",
            self.config.base_url.trim_end_matches('/'),
            page_id
        );
        let page: PageDetail = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ConnectorError::ItemFailed {
                item_id: page_id.to_string(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| ConnectorError::ItemFailed {
                item_id: page_id.to_string(),
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| ConnectorError::ItemFailed {
                item_id: page_id.to_string(),
                message: e.to_string(),
            })?;

        let breadcrumb: Vec<String> = page.ancestors.iter().map(|a| a.title.clone()).collect();
        let labels: Vec<String> = page.metadata.labels.results.iter().map(|l| l.name.clone()).collect();

        let mut doc = Document::new(
            "confluence",
            format!("{}:{}", self.source_label(), page.id),
            self.project_id.clone(),
            page.body.storage.value,
            "html",
        );
        doc.title = Some(page.title);
        doc.url = Some(format!(
            "{}/pages/viewpage.action?pageId={}",
            self.config.base_url.trim_end_matches('/'),
            page.id
        ));
        doc.metadata.insert("space_key".to_string(), serde_json::json!(self.config.space_key));
        doc.metadata.insert("page_id".to_string(), serde_json::json!(page.id));
        doc.metadata.insert("version".to_string(), serde_json::json!(page.version.number));
        doc.metadata.insert("labels".to_string(), serde_json::json!(labels));
        doc.metadata.insert("ancestors".to_string(), serde_json::json!(breadcrumb));
        Ok(doc.with_derived_id())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_label_is_confluence_prefixed() {
        let config = ConfluenceSourceConfig {
            base_url: "https://acme.atlassian.net/wiki".to_string(),
            space_key: "ENG".to_string(),
            token: None,
        };
        let connector = ConfluenceConnector::new("eng".into(), config, "proj1".into());
        assert_eq!(connector.source_label(), "confluence:eng");
    }
}
