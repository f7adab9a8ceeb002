use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tenderflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "TENDERFLOW_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "TENDERFLOW_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "TENDERFLOW_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "TENDERFLOW_LLM_PROVIDER"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "TENDERFLOW_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "TENDERFLOW_LLM_BASE_URL"),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "TENDERFLOW_LLM_API_KEY"),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", "TENDERFLOW_LLM_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "llm.max_retries",
        &config.llm.max_retries.to_string(),
        source("llm.max_retries", "TENDERFLOW_LLM_MAX_RETRIES"),
    ));
    lines.push(render_line(
        "llm.assist_qualification",
        &config.llm.assist_qualification.to_string(),
        source("llm.assist_qualification", "TENDERFLOW_LLM_ASSIST_QUALIFICATION"),
    ));

    lines.push(render_line(
        "engine.minimum_tender_value",
        &config.engine.minimum_tender_value.to_string(),
        source("engine.minimum_tender_value", "TENDERFLOW_ENGINE_MINIMUM_TENDER_VALUE"),
    ));
    lines.push(render_line(
        "engine.preferred_locations",
        &config.engine.preferred_locations.join(", "),
        source("engine.preferred_locations", "TENDERFLOW_ENGINE_PREFERRED_LOCATIONS"),
    ));
    lines.push(render_line(
        "engine.minimum_days_remaining",
        &config.engine.minimum_days_remaining.to_string(),
        source("engine.minimum_days_remaining", "TENDERFLOW_ENGINE_MINIMUM_DAYS_REMAINING"),
    ));
    lines.push(render_line(
        "engine.overhead_pct",
        &config.engine.overhead_pct.to_string(),
        source("engine.overhead_pct", "TENDERFLOW_ENGINE_OVERHEAD_PCT"),
    ));
    lines.push(render_line(
        "engine.contingency_pct",
        &config.engine.contingency_pct.to_string(),
        source("engine.contingency_pct", "TENDERFLOW_ENGINE_CONTINGENCY_PCT"),
    ));
    lines.push(render_line(
        "engine.assumed_length_km",
        &config.engine.assumed_length_km.to_string(),
        source("engine.assumed_length_km", "TENDERFLOW_ENGINE_ASSUMED_LENGTH_KM"),
    ));
    lines.push(render_line(
        "engine.currency",
        &config.engine.currency,
        source("engine.currency", "TENDERFLOW_ENGINE_CURRENCY"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "TENDERFLOW_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "TENDERFLOW_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "TENDERFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "TENDERFLOW_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "TENDERFLOW_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tenderflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tenderflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
