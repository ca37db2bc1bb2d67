//! Git connector: clones or updates a repository and walks files
//! under a configured root. Required metadata: file path, commit hash, repo
//! name, branch.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::GitSourceConfig;
use crate::errors::ConnectorError;
use crate::models::Document;

use super::Connector;

pub struct GitConnector {
    name: String,
    config: GitSourceConfig,
    cache_root: PathBuf,
    project_id: String,
}

impl GitConnector {
    pub fn new(name: String, config: GitSourceConfig, cache_root: PathBuf, project_id: String) -> Self {
        Self {
            name,
            config,
            cache_root,
            project_id,
        }
    }

    fn repo_cache_dir(&self) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.config.url.as_bytes());
        self.cache_root.join(hex::encode(hasher.finalize()))
    }

    fn repo_name(&self) -> String {
        self.config
            .url
            .rsplit('/')
            .next()
            .unwrap_or(&self.config.url)
            .trim_end_matches(".git")
            .to_string()
    }
}

#[async_trait::async_trait]
impl Connector for GitConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "git"
    }

    async fn get_documents(&self) -> Result<Vec<Document>, ConnectorError> {
        let name = self.name.clone();
        let config = self.config.clone();
        let cache_dir = self.repo_cache_dir();
        let repo_name = self.repo_name();
        let project_id = self.project_id.clone();
        let source_label = self.source_label();

        tokio::task::spawn_blocking(move || {
            scan_git(&name, &config, &cache_dir, &repo_name, &project_id, &source_label)
        })
        .await
        .map_err(|e| ConnectorError::Unreachable {
            connector: source_label,
            message: e.to_string(),
        })?
    }
}

fn scan_git(
    name: &str,
    config: &GitSourceConfig,
    cache_dir: &Path,
    repo_name: &str,
    project_id: &str,
    source_label: &str,
) -> Result<Vec<Document>, ConnectorError> {
    sync_repo(&config.url, &config.branch, cache_dir).map_err(|e| ConnectorError::Unreachable {
        connector: source_label.to_string(),
        message: e,
    })?;

    let head_sha = git_head_sha(cache_dir).unwrap_or_else(|_| "unknown".to_string());

    let include_set = build_globset(&config.include_globs).map_err(|e| ConnectorError::Unreachable {
        connector: source_label.to_string(),
        message: e,
    })?;
    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes).map_err(|e| ConnectorError::Unreachable {
        connector: source_label.to_string(),
        message: e,
    })?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(cache_dir) {
        let entry = entry.map_err(|e| ConnectorError::ItemFailed {
            item_id: name.to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(cache_dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %rel_str, error = %e, "git connector: skipping unreadable file");
                continue;
            }
        };

        let mut doc = Document::new(
            "git",
            format!("{}:{}", source_label, rel_str),
            project_id,
            content,
            "text",
        );
        doc.title = Some(rel_str.clone());
        doc.metadata.insert("file_path".to_string(), serde_json::json!(rel_str));
        doc.metadata.insert("commit_hash".to_string(), serde_json::json!(head_sha));
        doc.metadata.insert("repo_name".to_string(), serde_json::json!(repo_name));
        doc.metadata.insert("branch".to_string(), serde_json::json!(config.branch));
        doc.updated_at = Utc::now();
        documents.push(doc.with_derived_id());
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(documents)
}

fn sync_repo(url: &str, branch: &str, cache_dir: &Path) -> Result<(), String> {
    if cache_dir.join(".git").exists() {
        run_git(cache_dir, &["fetch", "origin", branch])?;
        run_git(cache_dir, &["reset", "--hard", &format!("origin/{branch}")])?;
    } else {
        std::fs::create_dir_all(cache_dir).map_err(|e| e.to_string())?;
        run_git(
            Path::new("."),
            &[
                "clone",
                "--branch",
                branch,
                "--single-branch",
                url,
                cache_dir.to_str().unwrap_or_default(),
            ],
        )?;
    }
    Ok(())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<(), String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map_err(|e| format!("failed to spawn git: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

fn git_head_sha(dir: &Path) -> Result<String, String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(["rev-parse", "HEAD"])
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err("git rev-parse failed".to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| e.to_string())?;
        builder.add(glob);
    }
    builder.build().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_strips_git_suffix() {
        let config = GitSourceConfig {
            url: "https://github.com/acme/platform.git".to_string(),
            branch: "main".to_string(),
            include_globs: vec![],
            exclude_globs: vec![],
        };
        let connector = GitConnector::new("p".into(), config, PathBuf::from("/tmp"), "proj1".into());
        assert_eq!(connector.repo_name(), "platform");
    }

    #[test]
    fn build_globset_matches_include_pattern() {
        let set = build_globset(&["**/*.md".to_string()]).unwrap();
        assert!(set.is_match("docs/guide.md"));
        assert!(!set.is_match("docs/guide.rs"));
    }
}
