//! Load configuration from XDG `config.toml` and project `.env`, then apply to
//! the process environment with priority: **existing env > .env > XDG**.
//!
//! The engine reads its knobs from the environment afterwards
//! (`EngineConfig::from_env` in the core crate). Recognized variables:
//!
//! - `PM_MCP_SERVER_URL`, `PM_MCP_API_KEY`, `PM_MCP_TRANSPORT` (stdio | http | sse)
//! - `BASIC_MODEL`, `REASONING_MODEL`
//! - `MAX_REPLAN_ITERATIONS`, `REACT_MAX_ITERATIONS`, `REACT_MAX_ERRORS`
//! - `TOOL_OUTPUT_TOKEN_BUDGET`, `TOOL_TIMEOUT_SECS`, `LLM_CONCURRENCY`
//! - `PROVIDER_SYNC_URL`

mod env_file;
mod xdg;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads config from XDG `config.toml` and optional project `.env`, then sets
/// environment variables only for keys that are **not** already set.
///
/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (current directory, or `override_dir` if given)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
///
/// * `app_name`: e.g. `"foreman"`, used for the XDG path.
/// * `override_dir`: if `Some`, look for `.env` there instead of the cwd.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg::load_env_map(app_name)?;
    let dotenv_map = env_file::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue; // existing env wins
        }
        if let Some(v) = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)) {
            std::env::set_var(&key, v);
        }
    }

    Ok(())
}
