//! PublicDocs connector: identifies documents by URL. Required
//! metadata: version, path, content_selector, extracted headings.
//!
//! Discovery is link-following from a single base URL, bounded to pages
//! reachable within the same origin — there's no sitemap contract assumed,
//! since public doc sites vary widely in how they expose one.

use std::collections::{HashSet, VecDeque};

use regex::Regex;

use crate::config::PublicDocsSourceConfig;
use crate::errors::ConnectorError;
use crate::models::Document;

use super::Connector;

const MAX_PAGES: usize = 500;

pub struct PublicDocsConnector {
    name: String,
    config: PublicDocsSourceConfig,
    project_id: String,
    client: reqwest::Client,
}

impl PublicDocsConnector {
    pub fn new(name: String, config: PublicDocsSourceConfig, project_id: String) -> Self {
        Self {
            name,
            config,
            project_id,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Connector for PublicDocsConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "publicdocs"
    }

    async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError> {
        let origin = origin_of(&self.config.base_url);
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([self.config.base_url.clone()]);
        let mut documents = Vec::new();

        let link_re = Regex::new(r#"(?i)<a[^>]+href=["']([^"'#]+)["']"#).unwrap();
        let heading_re = Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h\1>").unwrap();
        let tag_re = Regex::new(r"<[^>]+>").unwrap();

        while let Some(url) = queue.pop_front() {
            if visited.contains(&url) || visited.len() >= MAX_PAGES {
                continue;
            }
            visited.insert(url.clone());

            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "publicdocs connector: request failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                continue;
            }
            let html = match response.text().await {
                Ok(h) => h,
                Err(_) => continue,
            };

            for link_match in link_re.captures_iter(&html) {
                let href = &link_match[1];
                if let Some(resolved) = resolve_link(&url, href, &origin) {
                    if !visited.contains(&resolved) {
                        queue.push_back(resolved);
                    }
                }
            }

            let headings: Vec<String> = heading_re
                .captures_iter(&html)
                .map(|c| tag_re.replace_all(&c[2], "").trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            let mut doc = Document::new(
                "publicdocs",
                format!("{}:{}", self.source_label(), url),
                self.project_id.clone(),
                html,
                "html",
            );
            doc.title = headings.first().cloned();
            doc.url = Some(url.clone());
            doc.metadata.insert("version".to_string(), serde_json::json!("latest"));
            doc.metadata.insert("path".to_string(), serde_json::json!(path_of(&url)));
            doc.metadata.insert(
                "content_selector".to_string(),
                serde_json::json!(self.config.content_selector.clone()),
            );
            doc.metadata.insert("headings".to_string(), serde_json::json!(headings));
            documents.push(doc.with_derived_id());
        }

        if documents.is_empty() {
            return Err(ConnectorError::Unreachable {
                connector: self.source_label(),
                message: format!("no reachable pages from {}", self.config.base_url),
            });
        }

        documents.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(documents)
    }
}

fn origin_of(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    let scheme = if url.starts_with("https://") { "https" } else { "http" };
    format!("{scheme}://{host}")
}

fn path_of(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => without_scheme[idx..].to_string(),
        None => "/".to_string(),
    }
}

fn resolve_link(current: &str, href: &str, origin: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.starts_with(origin).then(|| href.to_string());
    }
    if href.starts_with("mailto:") || href.starts_with("javascript:") {
        return None;
    }
    if let Some(stripped) = href.strip_prefix('/') {
        return Some(format!("{origin}/{stripped}"));
    }
    let base_dir = current.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(current);
    Some(format!("{base_dir}/{href}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_extracts_scheme_and_host() {
        assert_eq!(origin_of("https://docs.example.com/guide/intro"), "https://docs.example.com");
    }

    #[test]
    fn resolve_link_handles_relative_and_absolute() {
        let origin = "https://docs.example.com";
        assert_eq!(
            resolve_link("https://docs.example.com/guide/intro", "setup", origin),
            Some("https://docs.example.com/guide/setup".to_string())
        );
        assert_eq!(
            resolve_link("https://docs.example.com/guide/intro", "/api/ref", origin),
            Some("https://docs.example.com/api/ref".to_string())
        );
        assert_eq!(
            resolve_link("https://docs.example.com/guide/intro", "https://other.com/x", origin),
            None
        );
    }
}
