use clap::Parser;
use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,   // Default model for translation, titles and charts
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// Full search endpoint, e.g. `http://localhost:9200/logs-*/_search`
    pub url: Option<String>,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelationalConfig {
    pub enabled: bool,
    /// DuckDB file queried by the secondary data fetcher
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token -> user id
    pub tokens: HashMap<String, String>,
}

/// A model selectable by chat clients.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    pub label: String,
    pub api_identifier: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub relational: RelationalConfig,
    pub auth: AuthConfig,
    pub models: Vec<ModelEntry>,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-search/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Environment variables win over the file for the deployment knobs.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ELASTICSEARCH_URL").filter(|u| !u.trim().is_empty()) {
            self.search.url = Some(url);
        }
        if let Some(username) = lookup("ELASTICSEARCH_USERNAME") {
            self.search.username = username;
        }
        if let Some(password) = lookup("ELASTICSEARCH_PASSWORD") {
            self.search.password = password;
        }
        if let Some(flag) = lookup("ENABLE_DATABASE_SEARCH") {
            self.relational.enabled = flag == "true";
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
    }

    pub fn find_model(&self, id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.id == id)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "nl-search.db".to_string(),
            pool_size: 5,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "remote".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_url: Some("https://api.openai.com/v1/chat/completions".to_string()),
            timeout_secs: 60,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: "elastic".to_string(),
            password: "changeme".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "relational.duckdb".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            web: WebConfig::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            relational: RelationalConfig::default(),
            auth: AuthConfig::default(),
            models: vec![
                ModelEntry {
                    id: "gpt-4o-mini".to_string(),
                    label: "GPT 4o mini".to_string(),
                    api_identifier: "gpt-4o-mini".to_string(),
                },
                ModelEntry {
                    id: "gpt-4o".to_string(),
                    label: "GPT 4o".to_string(),
                    api_identifier: "gpt-4o".to_string(),
                },
            ],
        }
    }
}
