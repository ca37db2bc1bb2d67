//! Jira connector: identifies documents by project + issue key.
//! Required metadata: project_key, issue_key, issue_type, status, priority,
//! reporter, assignee, labels, linked issues, comments.

use serde::Deserialize;
use serde_json::Value;

use crate::config::JiraSourceConfig;
use crate::errors::ConnectorError;
use crate::models::Document;

use super::Connector;

pub struct JiraConnector {
    name: String,
    config: JiraSourceConfig,
    project_id: String,
    client: reqwest::Client,
}

impl JiraConnector {
    pub fn new(name: String, config: JiraSourceConfig, project_id: String) -> Self {
        Self {
            name,
            config,
            project_id,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    issues: Vec<IssueSummary>,
}

#[derive(Debug, Deserialize)]
struct IssueSummary {
    key: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    summary: String,
    #[serde(default)]
    description: Option<String>,
    issuetype: NamedRef,
    status: NamedRef,
    #[serde(default)]
    priority: Option<NamedRef>,
    #[serde(default)]
    reporter: Option<PersonRef>,
    #[serde(default)]
    assignee: Option<PersonRef>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    issuelinks: Vec<IssueLink>,
    #[serde(default)]
    comment: CommentField,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PersonRef {
    #[serde(alias = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct IssueLink {
    #[serde(alias = "outwardIssue", alias = "inwardIssue")]
    outward_issue: Option<LinkedIssueRef>,
}

#[derive(Debug, Deserialize)]
struct LinkedIssueRef {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct CommentField {
    #[serde(default)]
    comments: Vec<CommentEntry>,
}

#[derive(Debug, Deserialize)]
struct CommentEntry {
    body: String,
}

#[async_trait::async_trait]
impl Connector for JiraConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "jira"
    }

    async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError> {
        let keys = self.search_issue_keys().await?;
        let mut documents = Vec::with_capacity(keys.len());
        for key in keys {
            documents.push(self.fetch_issue(&key).await?);
        }
        Ok(documents)
    }
}

impl JiraConnector {
    async fn search_issue_keys(&self) -> Result<Vec<String>, ConnectorError> {
        let jql = format!("project = {}", self.config.project_key);
        let url = format!("{}/rest/api/2/search", self.config.base_url.trim_end_matches('/'));
        let response = self
            .authorized(self.client.get(&url).query(&[("jql", jql.as_str()), ("maxResults", "200")]))
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
            .json::<SearchResponse>()
            .await
            .map_err(|e| ConnectorError::Unreachable {
                connector: self.source_label(),
                message: e.to_string(),
            })?;
        Ok(response.issues.into_iter().map(|i| i.key).collect())
    }

    async fn fetch_issue(&self, key: &str) -> Result<Document, ConnectorError> {
        let url = format!(
            "{}/rest/api/2/issue/{}?expand=renderedFields",
            self.config.base_url.trim_end_matches('/'),
            key
        );
        let issue: Issue = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ConnectorError::ItemFailed {
                item_id: key.to_string(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| ConnectorError::ItemFailed {
                item_id: key.to_string(),
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| ConnectorError::ItemFailed {
                item_id: key.to_string(),
                message: e.to_string(),
            })?;

        let mut content = issue.fields.summary.clone();
        if let Some(description) = &issue.fields.description {
            content.push_str("\n\n");
            content.push_str(description);
        }

        let linked: Vec<String> = issue
            .fields
            .issuelinks
            .iter()
            .filter_map(|l| l.outward_issue.as_ref().map(|r| r.key.clone()))
            .collect();
        let comments: Vec<String> = issue.fields.comment.comments.iter().map(|c| c.body.clone()).collect();

        let mut doc = Document::new(
            "jira",
            format!("{}:{}", self.source_label(), issue.key),
            self.project_id.clone(),
            content,
            "text",
        );
        doc.title = Some(format!("{}: {}", issue.key, issue.fields.summary));
        doc.url = Some(format!(
            "{}/browse/{}",
            self.config.base_url.trim_end_matches('/'),
            issue.key
        ));
        doc.metadata.insert("project_key".to_string(), Value::String(self.config.project_key.clone()));
        doc.metadata.insert("issue_key".to_string(), Value::String(issue.key.clone()));
        doc.metadata.insert("issue_type".to_string(), Value::String(issue.fields.issuetype.name));
        doc.metadata.insert("status".to_string(), Value::String(issue.fields.status.name));
        doc.metadata.insert(
            "priority".to_string(),
            issue.fields.priority.map(|p| Value::String(p.name)).unwrap_or(Value::Null),
        );
        doc.metadata.insert(
            "reporter".to_string(),
            issue.fields.reporter.map(|p| Value::String(p.display_name)).unwrap_or(Value::Null),
        );
        doc.metadata.insert(
            "assignee".to_string(),
            issue.fields.assignee.map(|p| Value::String(p.display_name)).unwrap_or(Value::Null),
        );
        doc.metadata.insert("labels".to_string(), serde_json::json!(issue.fields.labels));
        doc.metadata.insert("linked_issues".to_string(), serde_json::json!(linked));
        doc.metadata.insert("comments".to_string(), serde_json::json!(comments));
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
    fn source_label_is_jira_prefixed() {
        let config = JiraSourceConfig {
            base_url: "https://acme.atlassian.net".to_string(),
            project_key: "ENG".to_string(),
            token: None,
        };
        let connector = JiraConnector::new("eng".into(), config, "proj1".into());
        assert_eq!(connector.source_label(), "jira:eng");
    }
}
