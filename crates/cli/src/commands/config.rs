use std::env;
use std::fs;
use std::path::Path;

use permitdesk_core::config::{resolve_config_path, AppConfig, ConfigOverrides, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

/// One reportable setting: dotted file key, env keys in lookup order, rendered value.
struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
    overridden: bool,
}

pub fn run() -> CommandResult {
    run_with(LoadOptions::default())
}

pub fn run_with(options: LoadOptions) -> CommandResult {
    let config_path = resolve_config_path(options.config_path.as_deref());
    let overrides = options.overrides.clone();

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: EXIT_CONFIG,
                output: format!("config validation failed: {error}"),
            };
        }
    };

    let file_doc = config_path.as_deref().and_then(load_file_doc);
    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    if let Some(path) = &config_path {
        lines.push(format!("config file: {}", path.display()));
    }

    for field in fields(&config, &overrides) {
        let source = field_source(&field, file_doc.as_ref(), config_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    CommandResult::text(lines.join("\n"))
}

fn fields(config: &AppConfig, overrides: &ConfigOverrides) -> Vec<Field> {
    vec![
        Field {
            key: "database.url",
            env_keys: &["PERMITDESK_DATABASE_URL"],
            value: config.database.url.clone(),
            overridden: overrides.database_url.is_some(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["PERMITDESK_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
            overridden: false,
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["PERMITDESK_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
            overridden: false,
        },
        Field {
            key: "server.bind_address",
            env_keys: &["PERMITDESK_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
            overridden: overrides.bind_address.is_some(),
        },
        Field {
            key: "server.port",
            env_keys: &["PERMITDESK_SERVER_PORT"],
            value: config.server.port.to_string(),
            overridden: overrides.port.is_some(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_keys: &["PERMITDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
            overridden: false,
        },
        Field {
            key: "realtime.enabled",
            env_keys: &["PERMITDESK_REALTIME_ENABLED"],
            value: config.realtime.enabled.to_string(),
            overridden: overrides.realtime_enabled.is_some(),
        },
        Field {
            key: "realtime.heartbeat_interval_secs",
            env_keys: &["PERMITDESK_REALTIME_HEARTBEAT_INTERVAL_SECS"],
            value: config.realtime.heartbeat_interval_secs.to_string(),
            overridden: false,
        },
        Field {
            key: "workflow.collaborative_issues_block",
            env_keys: &["PERMITDESK_WORKFLOW_COLLABORATIVE_ISSUES_BLOCK"],
            value: config.workflow.collaborative_issues_block.to_string(),
            overridden: false,
        },
        Field {
            key: "workflow.participant_summary_limit",
            env_keys: &["PERMITDESK_WORKFLOW_PARTICIPANT_SUMMARY_LIMIT"],
            value: config.workflow.participant_summary_limit.to_string(),
            overridden: false,
        },
        Field {
            key: "logging.level",
            env_keys: &["PERMITDESK_LOGGING_LEVEL", "PERMITDESK_LOG_LEVEL"],
            value: config.logging.level.clone(),
            overridden: overrides.log_level.is_some(),
        },
        Field {
            key: "logging.format",
            env_keys: &["PERMITDESK_LOGGING_FORMAT", "PERMITDESK_LOG_FORMAT"],
            value: config.logging.format.as_str().to_string(),
            overridden: false,
        },
    ]
}

fn load_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if field.overridden {
        return "override".to_string();
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let shown = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({shown})");
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
