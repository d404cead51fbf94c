//! Source configuration loading.
//!
//! Documentation sources are declared in a TOML file as an ordered list of
//! `[[sources]]` tables. The only required field per source is `tool_name`;
//! everything else has a sensible default. A missing or malformed file is
//! fatal at startup since there is nothing to serve without it.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name probed when no explicit `--config` path is given.
pub const DEFAULT_CONFIG_NAME: &str = "sources.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read configuration file {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Declared content type of a source, selecting the normalizer applied to
/// its fetched payloads. Unrecognized values deserialize to `Unknown`,
/// which passes raw content through unmodified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Html,
    Xml,
    Json,
    RepoMarkdown,
    #[serde(other)]
    Unknown,
}

/// One configured documentation source, immutable per refresh cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    /// Unique key the source is addressed by.
    pub tool_name: String,

    #[serde(default)]
    display_name: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub content_type: ContentType,

    #[serde(default = "default_strip_deprecated")]
    pub strip_deprecated: bool,

    #[serde(default)]
    pub filter_sections: Option<Vec<String>>,
}

fn default_strip_deprecated() -> bool {
    true
}

impl SourceSpec {
    /// Bare spec with defaults, for programmatic construction.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            display_name: None,
            description: String::new(),
            urls: Vec::new(),
            content_type: ContentType::default(),
            strip_deprecated: default_strip_deprecated(),
            filter_sections: None,
        }
    }

    /// Human-facing name, falling back to the tool name.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.tool_name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Re-run the full refresh cycle this often. Absent means fetch once
    /// at startup and serve that snapshot for the process lifetime.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,

    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

/// Resolve the configuration path: an explicit path must exist, otherwise
/// `sources.toml` is searched in the working directory and up to three
/// parent directories.
pub fn find_config(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::Missing(path.to_path_buf()));
    }

    let cwd = std::env::current_dir().map_err(|source| ConfigError::Unreadable {
        path: PathBuf::from("."),
        source,
    })?;
    let mut dir = Some(cwd.as_path());
    for _ in 0..4 {
        let Some(d) = dir else { break };
        let candidate = d.join(DEFAULT_CONFIG_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        dir = d.parent();
    }
    Err(ConfigError::Missing(PathBuf::from(DEFAULT_CONFIG_NAME)))
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_minimal_source_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[sources]]
            tool_name = "sdk_docs"
            "#,
        )
        .unwrap();

        assert_eq!(config.sources.len(), 1);
        let spec = &config.sources[0];
        assert_eq!(spec.tool_name, "sdk_docs");
        assert_eq!(spec.display_name(), "sdk_docs");
        assert_eq!(spec.description, "");
        assert!(spec.urls.is_empty());
        assert_eq!(spec.content_type, ContentType::Html);
        assert!(spec.strip_deprecated);
        assert!(spec.filter_sections.is_none());
        assert!(config.refresh_interval_secs.is_none());
    }

    #[test]
    fn test_full_source() {
        let config: Config = toml::from_str(
            r#"
            refresh_interval_secs = 3600

            [[sources]]
            tool_name = "dicom_standard"
            display_name = "DICOM Standard"
            description = "Data dictionary extract"
            urls = ["https://example.com/part06.xml"]
            content_type = "xml"
            strip_deprecated = false
            filter_sections = ["data_dictionary", "transfer_syntaxes"]
            "#,
        )
        .unwrap();

        let spec = &config.sources[0];
        assert_eq!(spec.display_name(), "DICOM Standard");
        assert_eq!(spec.content_type, ContentType::Xml);
        assert!(!spec.strip_deprecated);
        assert_eq!(
            spec.filter_sections.as_deref().unwrap(),
            ["data_dictionary", "transfer_syntaxes"]
        );
        assert_eq!(config.refresh_interval_secs, Some(3600));
    }

    #[test]
    fn test_unrecognized_content_type_degrades_to_unknown() {
        let config: Config = toml::from_str(
            r#"
            [[sources]]
            tool_name = "blob"
            content_type = "protobuf"
            "#,
        )
        .unwrap();
        assert_eq!(config.sources[0].content_type, ContentType::Unknown);
    }

    #[test]
    fn test_missing_tool_name_is_malformed() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [[sources]]
            display_name = "No key"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_explicit_missing() {
        let err = find_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.toml");
        fs::write(
            &path,
            r#"
            [[sources]]
            tool_name = "readme"
            urls = ["https://example.com/readme"]
            content_type = "repo_markdown"
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.sources[0].content_type, ContentType::RepoMarkdown);
    }

    #[test]
    fn test_load_config_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.toml");
        fs::write(&path, "sources = not valid toml").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }
}
