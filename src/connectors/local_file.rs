//! LocalFile connector: walks a local directory with glob
//! include/exclude patterns. Required metadata: relative path, file size,
//! mime_type, modified timestamp.

use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::LocalFileSourceConfig;
use crate::errors::ConnectorError;
use crate::extract;
use crate::file_conversion;
use crate::models::Document;

use super::Connector;

const DEFAULT_MAX_CONVERSION_SIZE: usize = 20 * 1024 * 1024;
const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(60);

pub struct LocalFileConnector {
    name: String,
    config: LocalFileSourceConfig,
    project_id: String,
}

impl LocalFileConnector {
    pub fn new(name: String, config: LocalFileSourceConfig, project_id: String) -> Self {
        Self {
            name,
            config,
            project_id,
        }
    }
}

#[async_trait::async_trait]
impl Connector for LocalFileConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "localfile"
    }

    async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError> {
        let candidates = scan_candidates(&self.config, &self.source_label()).map_err(|e| {
            ConnectorError::Unreachable {
                connector: self.source_label(),
                message: e,
            }
        })?;

        let mut documents = Vec::new();
        for candidate in candidates {
            let document = materialize(candidate, &self.project_id).await?;
            documents.push(document);
        }
        documents.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(documents)
    }
}

struct Candidate {
    path: std::path::PathBuf,
    relative_path: String,
    size: u64,
    modified_secs: i64,
    mime_type: Option<&'static str>,
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "pdf" => Some(extract::MIME_PDF),
        "docx" => Some(extract::MIME_DOCX),
        "pptx" => Some(extract::MIME_PPTX),
        "xlsx" => Some(extract::MIME_XLSX),
        _ => None,
    }
}

fn scan_candidates(config: &LocalFileSourceConfig, source_label: &str) -> Result<Vec<Candidate>, String> {
    if !config.root.exists() {
        return Err(format!("root does not exist: {}", config.root.display()));
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut candidates = Vec::new();
    for entry in WalkDir::new(&config.root) {
        let entry = entry.map_err(|e| format!("{source_label}: {e}"))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&config.root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
        let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let modified_secs = modified
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let ext = path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();

        candidates.push(Candidate {
            path: path.to_path_buf(),
            relative_path: rel_str,
            size: metadata.len(),
            modified_secs,
            mime_type: mime_for_extension(&ext),
        });
    }

    Ok(candidates)
}

async fn materialize(candidate: Candidate, project_id: &str) -> Result<Document, ConnectorError> {
    let source = format!("localfile:{}", candidate.relative_path);

    if let Some(mime) = candidate.mime_type {
        let bytes = std::fs::read(&candidate.path).map_err(|e| ConnectorError::ItemFailed {
            item_id: candidate.relative_path.clone(),
            message: e.to_string(),
        })?;
        let mut doc = Document::new("localfile", source, project_id, "", mime);
        attach_local_file_metadata(&mut doc, &candidate);
        let converted = file_conversion::convert(doc, &bytes, DEFAULT_MAX_CONVERSION_SIZE, DEFAULT_CONVERSION_TIMEOUT)
            .await
            .map_err(|e| ConnectorError::ConversionFailed {
                path: candidate.relative_path.clone(),
                message: e.to_string(),
            })?;
        return Ok(converted.with_derived_id());
    }

    let content = std::fs::read_to_string(&candidate.path).map_err(|e| ConnectorError::ItemFailed {
        item_id: candidate.relative_path.clone(),
        message: e.to_string(),
    })?;
    let mut doc = Document::new("localfile", source, project_id, content, "text");
    attach_local_file_metadata(&mut doc, &candidate);
    Ok(doc.with_derived_id())
}

fn attach_local_file_metadata(doc: &mut Document, candidate: &Candidate) {
    doc.title = candidate
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    doc.url = Some(format!("file://{}", candidate.path.display()));
    doc.updated_at = Utc
        .timestamp_opt(candidate.modified_secs, 0)
        .single()
        .unwrap_or_else(Utc::now);
    doc.metadata
        .insert("relative_path".to_string(), serde_json::json!(candidate.relative_path));
    doc.metadata.insert("file_size".to_string(), serde_json::json!(candidate.size));
    doc.metadata.insert(
        "mime_type".to_string(),
        serde_json::json!(candidate.mime_type.unwrap_or("text/plain")),
    );
    doc.metadata.insert(
        "modified_timestamp".to_string(),
        serde_json::json!(candidate.modified_secs),
    );
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| e.to_string())?);
    }
    builder.build().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn scans_and_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("note.md");
        std::fs::File::create(&file_path)
            .unwrap()
            .write_all(b"hello")
            .unwrap();

        let config = LocalFileSourceConfig {
            root: dir.path().to_path_buf(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec![],
        };
        let connector = LocalFileConnector::new("docs".into(), config, "proj1".into());
        let docs = connector.get_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "hello");
        assert_eq!(docs[0].metadata.get("relative_path").unwrap(), "note.md");
    }

    #[test]
    fn missing_root_errors() {
        let config = LocalFileSourceConfig {
            root: Path::new("/nonexistent/root/path").to_path_buf(),
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
        };
        assert!(scan_candidates(&config, "localfile:x").is_err());
    }
}
