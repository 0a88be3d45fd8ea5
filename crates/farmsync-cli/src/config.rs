//! Environment-based configuration for the farmsync CLI.

use std::env;
use std::path::PathBuf;

use crate::CliError;

const DEFAULT_DB_FILE: &str = "farmsync.db";
const DEFAULT_CURRENCY: &str = "USD";

/// Resolved CLI configuration.
///
/// Everything comes from the environment; there is no config file. The token
/// and farm id are issued by the authentication flow of the hosting app and
/// passed through verbatim.
#[derive(Debug)]
pub struct Config {
    pub api_url: String,
    pub token: String,
    pub farm_id: i64,
    pub currency: String,
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, CliError> {
        let api_url = require("FARMSYNC_API_URL")?;
        let token = require("FARMSYNC_TOKEN")?;
        let farm_id = require("FARMSYNC_FARM_ID")?
            .parse::<i64>()
            .map_err(|_| CliError::InvalidConfiguration("FARMSYNC_FARM_ID must be an integer"))?;

        let currency = env::var("FARMSYNC_CURRENCY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let db_path = env::var("FARMSYNC_DB")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DB_FILE), PathBuf::from);

        Ok(Self {
            api_url,
            token,
            farm_id,
            currency,
            db_path,
        })
    }
}

fn require(name: &'static str) -> Result<String, CliError> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(CliError::MissingConfiguration(name))
}
