//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, InvalidateCacheArgs, RedisOverride, ServeArgs, ServeOverrides};

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "roamly";
const ENV_PREFIX: &str = "ROAMLY";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_DB_MAX_CONNECTIONS: u64 = 8;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";
const DEFAULT_RESPONSE_TTL_SECS: u64 = 3600;
const DEFAULT_HIERARCHY_TTL_SECS: u64 = 3600;
const DEFAULT_RECOMMENDATIONS_TTL_SECS: u64 = 1800;
const DEFAULT_TRENDING_TTL_SECS: u64 = 900;
const DEFAULT_MEMORY_CAPACITY: u64 = 10_000;
const DEFAULT_SEARCH_URL: &str = "http://127.0.0.1:9200";
const DEFAULT_VIEWS_INDEX: &str = "place_views";
const DEFAULT_PLACES_INDEX: &str = "places";
const DEFAULT_RADIUS_KM: u64 = 10;
const DEFAULT_HISTORY_SIZE: u64 = 50;
const DEFAULT_RESULT_LIMIT: u64 = 10;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend `{other}` (expected redis or memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub enable_response_cache: bool,
    pub response_ttl: Duration,
    pub hierarchy_ttl: Duration,
    pub recommendations_ttl: Duration,
    pub trending_ttl: Duration,
    pub single_flight: bool,
    pub memory_capacity: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub views_index: String,
    pub places_index: String,
    pub radius_km: NonZeroU32,
    pub history_size: NonZeroU32,
    pub result_limit: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Build settings from configuration files, environment, and CLI overrides.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::InvalidateCache(args)) => raw.apply_redis_override(&args.redis),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    search: RawSearchSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    redis_url: Option<String>,
    enable_response_cache: Option<bool>,
    response_ttl_seconds: Option<u64>,
    hierarchy_ttl_seconds: Option<u64>,
    recommendations_ttl_seconds: Option<u64>,
    trending_ttl_seconds: Option<u64>,
    single_flight: Option<bool>,
    memory_capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    url: Option<String>,
    api_key: Option<String>,
    views_index: Option<String>,
    places_index: Option<String>,
    radius_km: Option<u64>,
    history_size: Option<u64>,
    result_limit: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.search_url.as_ref() {
            self.search.url = Some(url.clone());
        }

        self.apply_redis_override(&overrides.redis);
    }

    fn apply_redis_override(&mut self, overrides: &RedisOverride) {
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            search,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            search: build_search_settings(search)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    if public_port == admin_port {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin port must differ from the public port",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;
    let admin_addr = parse_socket_addr(&host, admin_port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    Ok(ServerSettings {
        public_addr,
        admin_addr,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::Redis,
    };

    let redis_url = non_blank(cache.redis_url).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    Url::parse(&redis_url)
        .map_err(|err| LoadError::invalid("cache.redis_url", format!("invalid url: {err}")))?;

    Ok(CacheSettings {
        backend,
        redis_url,
        enable_response_cache: cache.enable_response_cache.unwrap_or(true),
        response_ttl: ttl(
            cache.response_ttl_seconds,
            DEFAULT_RESPONSE_TTL_SECS,
            "cache.response_ttl_seconds",
        )?,
        hierarchy_ttl: ttl(
            cache.hierarchy_ttl_seconds,
            DEFAULT_HIERARCHY_TTL_SECS,
            "cache.hierarchy_ttl_seconds",
        )?,
        recommendations_ttl: ttl(
            cache.recommendations_ttl_seconds,
            DEFAULT_RECOMMENDATIONS_TTL_SECS,
            "cache.recommendations_ttl_seconds",
        )?,
        trending_ttl: ttl(
            cache.trending_ttl_seconds,
            DEFAULT_TRENDING_TTL_SECS,
            "cache.trending_ttl_seconds",
        )?,
        single_flight: cache.single_flight.unwrap_or(false),
        memory_capacity: non_zero_u32(
            cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
            "cache.memory_capacity",
        )?,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let url = non_blank(search.url).unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
    let parsed = Url::parse(&url)
        .map_err(|err| LoadError::invalid("search.url", format!("invalid url: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "search.url",
            "scheme must be http or https",
        ));
    }

    let views_index =
        non_blank(search.views_index).unwrap_or_else(|| DEFAULT_VIEWS_INDEX.to_string());
    let places_index =
        non_blank(search.places_index).unwrap_or_else(|| DEFAULT_PLACES_INDEX.to_string());

    Ok(SearchSettings {
        url,
        api_key: non_blank(search.api_key),
        views_index,
        places_index,
        radius_km: non_zero_u32(
            search.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
            "search.radius_km",
        )?,
        history_size: non_zero_u32(
            search.history_size.unwrap_or(DEFAULT_HISTORY_SIZE),
            "search.history_size",
        )?,
        result_limit: non_zero_u32(
            search.result_limit.unwrap_or(DEFAULT_RESULT_LIMIT),
            "search.result_limit",
        )?,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn ttl(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        seconds => Ok(Duration::from_secs(seconds)),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
