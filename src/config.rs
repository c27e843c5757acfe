use std::{env, io};

use serde::Serialize;
use tracing::debug;

const DEFAULT_GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_GEOCODER_TIMEOUT_SECS: u64 = 5;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub geocoder_base_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_timeout_secs: u64,
    pub database_file_name: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            geocoder_base_url: env::var("GEOCODER_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEOCODER_BASE_URL.to_string()),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| {
                    format!("craftmatch/{}", env!("CARGO_PKG_VERSION"))
                }),
            geocoder_timeout_secs: parse_u64(
                "GEOCODER_TIMEOUT_SECS",
                DEFAULT_GEOCODER_TIMEOUT_SECS,
            )
            .max(1),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "craftmatch.db".to_string()),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
