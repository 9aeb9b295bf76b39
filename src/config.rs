//! Configuration loader and validator for the tutorial scout.
use crate::model::UploadDateFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid excluded pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub youtube: YouTube,
    pub storage: Storage,
}

/// Scrape tuning and category lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    #[serde(default = "default_min_duration")]
    pub min_duration_seconds: i64,
    #[serde(default = "default_max_results")]
    pub max_results_per_query: u32,
    #[serde(default = "default_upload_date_filter")]
    pub upload_date_filter: UploadDateFilter,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_subjects")]
    pub subjects: Vec<String>,
    /// Regional-language indicator patterns; matched word-boundary and
    /// case-insensitively against title, description and channel name.
    #[serde(default = "default_excluded_patterns")]
    pub excluded_patterns: Vec<String>,
}

/// Video platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YouTube {
    #[serde(default)]
    pub api_key: String,
}

/// Storage backend selection and per-backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Storage {
    pub backend: Backend,
    #[serde(default)]
    pub sqlite: Sqlite,
    #[serde(default)]
    pub docstore: Option<DocStore>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Docstore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sqlite {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for Sqlite {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

/// Hosted document-store settings. The account key may instead be provided
/// via the `DOCSTORE_KEY` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocStore {
    pub endpoint: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_docstore_database")]
    pub database: String,
    #[serde(default = "default_docstore_container")]
    pub container: String,
}

fn default_min_duration() -> i64 {
    120
}

fn default_max_results() -> u32 {
    25
}

fn default_upload_date_filter() -> UploadDateFilter {
    UploadDateFilter::Month
}

fn default_database_url() -> String {
    "sqlite://./data/tutorials.db".to_string()
}

fn default_docstore_database() -> String {
    "YouTubeTutorials".to_string()
}

fn default_docstore_container() -> String {
    "tutorials".to_string()
}

fn default_languages() -> Vec<String> {
    [
        "Python",
        "JavaScript",
        "TypeScript",
        "Java",
        "C#",
        "C++",
        "Go",
        "Rust",
        "Ruby",
        "PHP",
        "Swift",
        "Kotlin",
        "SQL",
        "R",
        "Scala",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_subjects() -> Vec<String> {
    [
        "Web Development",
        "Machine Learning",
        "Data Science",
        "Backend Development",
        "Frontend Development",
        "DevOps",
        "Cloud Computing",
        "Database",
        "API Development",
        "Mobile Development",
        "Game Development",
        "Algorithms",
        "Data Structures",
        "System Design",
        "Microservices",
        "Docker",
        "Kubernetes",
        "React",
        "Node.js",
        "Django",
        "Flask",
        "FastAPI",
        "Spring Boot",
        "REST API",
        "GraphQL",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_patterns() -> Vec<String> {
    [
        r"\b(hindi|हिंदी|हिन्दी)\b",
        r"\b(tamil|தமிழ்)\b",
        r"\b(telugu|తెలుగు)\b",
        r"\b(malayalam|മലയാളം)\b",
        r"\b(kannada|ಕನ್ನಡ)\b",
        r"\b(bengali|বাংলা)\b",
        r"\b(marathi|मराठी)\b",
        r"\b(gujarati|ગુજરાતી)\b",
        r"\b(punjabi|ਪੰਜਾਬੀ)\b",
        r"\bin hindi\b",
        r"\bhindi tutorial\b",
        r"\bhindi me\b",
        r"\bhindi mein\b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. Credential presence is checked by the
/// component that needs the credential, so env-var fallbacks keep working.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.min_duration_seconds < 0 {
        return Err(ConfigError::Invalid(
            "app.min_duration_seconds must be >= 0",
        ));
    }
    if cfg.app.max_results_per_query == 0 || cfg.app.max_results_per_query > 50 {
        return Err(ConfigError::Invalid(
            "app.max_results_per_query must be between 1 and 50",
        ));
    }
    // Catch malformed patterns at startup instead of at first scrape.
    for pattern in &cfg.app.excluded_patterns {
        regex::Regex::new(pattern)?;
    }

    match cfg.storage.backend {
        Backend::Sqlite => {
            if cfg.storage.sqlite.database_url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.sqlite.database_url must be non-empty",
                ));
            }
        }
        Backend::Docstore => {
            let Some(doc) = &cfg.storage.docstore else {
                return Err(ConfigError::Invalid(
                    "storage.docstore section is required when storage.backend is 'docstore'",
                ));
            };
            if doc.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.docstore.endpoint must be non-empty",
                ));
            }
            if doc.database.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.docstore.database must be non-empty",
                ));
            }
            if doc.container.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.docstore.container must be non-empty",
                ));
            }
        }
    }

    Ok(())
}

/// A complete sample configuration. Category lists and locale patterns fall
/// back to built-in defaults when omitted.
pub fn example() -> &'static str {
    r#"app:
  min_duration_seconds: 120
  max_results_per_query: 25
  upload_date_filter: month

youtube:
  api_key: "YOUR_YOUTUBE_API_KEY"

storage:
  backend: sqlite
  sqlite:
    database_url: "sqlite://./data/tutorials.db"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.min_duration_seconds, 120);
        assert_eq!(cfg.app.upload_date_filter, UploadDateFilter::Month);
        assert_eq!(cfg.storage.backend, Backend::Sqlite);
    }

    #[test]
    fn category_defaults_populated() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        assert!(cfg.app.languages.iter().any(|l| l == "Python"));
        assert!(cfg.app.subjects.iter().any(|s| s == "Machine Learning"));
        assert_eq!(cfg.app.languages.len(), 15);
        assert_eq!(cfg.app.subjects.len(), 25);
        assert!(!cfg.app.excluded_patterns.is_empty());
    }

    #[test]
    fn invalid_max_results() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.max_results_per_query = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        cfg.app.max_results_per_query = 51;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_excluded_pattern() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.excluded_patterns.push("(unclosed".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn docstore_backend_requires_section() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.storage.backend = Backend::Docstore;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("storage.docstore")),
            _ => panic!("wrong error"),
        }

        cfg.storage.docstore = Some(DocStore {
            endpoint: "https://acct.example.net".into(),
            key: String::new(),
            database: default_docstore_database(),
            container: default_docstore_container(),
        });
        validate(&cfg).unwrap();
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.youtube.api_key, "YOUR_YOUTUBE_API_KEY");
    }
}
