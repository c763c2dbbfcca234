//! Runtime configuration loaded from the environment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Output format for the tracing subscriber installed by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub blob_dir: PathBuf,
    pub public_blob_url: String,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_map(&env::vars().collect())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> AppResult<Self> {
        let log_format = match get(vars, "COMMISSION_LOG_FORMAT", "pretty").as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(AppError::Config(format!(
                    "COMMISSION_LOG_FORMAT must be `pretty` or `json`, got `{other}`"
                )))
            }
        };
        Ok(Self {
            bind_addr: get(vars, "COMMISSION_BIND_ADDR", "127.0.0.1:3000"),
            blob_dir: PathBuf::from(get(vars, "COMMISSION_BLOB_DIR", "proofs")),
            public_blob_url: get(
                vars,
                "COMMISSION_PUBLIC_BLOB_URL",
                "http://127.0.0.1:3000/proofs",
            )
            .trim_end_matches('/')
            .to_string(),
            log_format,
        })
    }
}

fn get(vars: &HashMap<String, String>, key: &str, default: &str) -> String {
    vars.get(key)
        .cloned()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
