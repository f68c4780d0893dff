use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{
    domain::{ChannelId, GuildId},
    errors::Error,
    Result,
};

pub const DEFAULT_HEALTH_PORT: u16 = 10000;
pub const DEFAULT_CLOSE_COMMAND: &str = "!close";
pub const DEFAULT_LOG_QUEUE_CAPACITY: usize = 256;

/// Where forwarded-message log entries are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreTarget {
    /// SQLite database; the value is a filesystem path or a `file:` URI.
    Sqlite(String),
    /// Append-only JSON lines file.
    Jsonl(PathBuf),
}

impl StoreTarget {
    /// Parse a `STORE_URI` value (`sqlite://...` or `jsonl://...`).
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if let Some(rest) = uri.strip_prefix("sqlite://") {
            if rest.is_empty() {
                return Err(Error::Config("STORE_URI has an empty sqlite path".to_string()));
            }
            return Ok(Self::Sqlite(rest.to_string()));
        }
        if let Some(rest) = uri.strip_prefix("jsonl://") {
            if rest.is_empty() {
                return Err(Error::Config("STORE_URI has an empty jsonl path".to_string()));
            }
            return Ok(Self::Jsonl(PathBuf::from(rest)));
        }
        Err(Error::Config(format!(
            "STORE_URI must start with sqlite:// or jsonl:// (got {uri:?})"
        )))
    }
}

/// Typed configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub staff_guild_id: GuildId,
    pub ticket_category_id: ChannelId,

    // Persistence
    pub store: StoreTarget,
    pub log_queue_capacity: usize,

    // Health endpoint
    pub health_host: String,
    pub health_port: u16,

    // Behavior
    pub close_command: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required values
        let discord_token = required(&get, "DISCORD_TOKEN")?;
        let staff_guild_id =
            GuildId(parse_snowflake("STAFF_GUILD_ID", &required(&get, "STAFF_GUILD_ID")?)?);
        let ticket_category_id =
            ChannelId(parse_snowflake("CATEGORY_ID", &required(&get, "CATEGORY_ID")?)?);
        let store = StoreTarget::parse(&required(&get, "STORE_URI")?)?;

        // Optional values
        let health_port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {raw:?}")))?,
            None => DEFAULT_HEALTH_PORT,
        };
        let health_host = get("HEALTH_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let close_command = get("CLOSE_COMMAND")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_CLOSE_COMMAND.to_string());
        let log_queue_capacity = get("LOG_QUEUE_CAPACITY")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_LOG_QUEUE_CAPACITY)
            .max(1);

        Ok(Self {
            discord_token,
            staff_guild_id,
            ticket_category_id,
            store,
            log_queue_capacity,
            health_host,
            health_port,
            close_command,
        })
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    get(key).ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn parse_snowflake(key: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::Config(format!("{key} is not a valid Discord id: {raw:?}"))),
    }
}

/// Export `.env` pairs that the process environment does not already set.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in dotenv_pairs(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// `KEY=value` lines; blank lines, `#` comments and keyless lines are skipped.
/// One layer of matching single or double quotes around the value is removed.
fn dotenv_pairs(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), unquote(v.trim())))
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| {
            value
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(value)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
