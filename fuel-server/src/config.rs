//! Application configuration from environment variables.

use std::env::VarError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{BackendClientConfig, Field, Normalizer, PaginationConfig};
use crate::store::StoreConfig;

const DEFAULT_BACKEND_URL: &str = "https://api.baserow.io";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Errors from reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Everything the binary needs to wire the service together.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    /// Empty when unset; requests then go out unauthenticated.
    pub backend_token: String,
    /// Required unless `mock_data` is set.
    pub table_id: Option<u64>,
    pub page_size: u32,
    pub max_pages: u32,
    pub cache_ttl: Duration,
    pub fallback_ttl: Duration,
    pub cache_path: Option<PathBuf>,
    /// Realtime updates are off when unset.
    pub realtime_url: Option<String>,
    pub regions_path: Option<PathBuf>,
    /// Backend column identifiers mapped onto canonical fields.
    pub field_map: Vec<(Field, String)>,
    /// Serve rows from this JSON file instead of the backend.
    pub mock_data: Option<PathBuf>,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Client settings for the real backend; `None` in mock mode.
    pub fn backend_client_config(&self) -> Option<BackendClientConfig> {
        if self.mock_data.is_some() {
            return None;
        }
        let table_id = self.table_id?;
        Some(
            BackendClientConfig::new(&self.backend_token, table_id)
                .with_base_url(&self.backend_url),
        )
    }

    pub fn pagination_config(&self) -> PaginationConfig {
        PaginationConfig::new(self.page_size, self.max_pages)
    }

    pub fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::new(self.cache_ttl).with_fallback_ttl(self.fallback_ttl);
        match &self.cache_path {
            Some(path) => config.with_persist_path(path),
            None => config,
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        self.field_map
            .iter()
            .fold(Normalizer::new(), |n, (field, key)| n.with_field_id(field.clone(), key))
    }
}

/// Load configuration, reading a `.env` file first if there is one.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load configuration from the process environment only.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build configuration from an arbitrary variable lookup.
///
/// Empty values count as unset.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        optional(var).unwrap_or_else(|| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let value = or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let parse_secs = |var: &str, default: &str| -> Result<Duration, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| invalid(var, e.to_string()))
    };

    let mock_data = optional("FUEL_MOCK_DATA").map(PathBuf::from);

    let table_id = match optional("FUEL_TABLE_ID") {
        Some(raw) => Some(
            raw.parse::<u64>()
                .map_err(|e| invalid("FUEL_TABLE_ID", e.to_string()))?,
        ),
        None if mock_data.is_some() => None,
        None => return Err(ConfigError::MissingEnvVar("FUEL_TABLE_ID".to_string())),
    };

    let bind_addr = or_default("FUEL_BIND_ADDR", DEFAULT_BIND_ADDR)
        .parse::<SocketAddr>()
        .map_err(|e| invalid("FUEL_BIND_ADDR", e.to_string()))?;

    let field_map = match optional("FUEL_FIELD_MAP") {
        Some(raw) => parse_field_map(&raw).map_err(|reason| invalid("FUEL_FIELD_MAP", reason))?,
        None => Vec::new(),
    };

    Ok(AppConfig {
        backend_url: or_default("FUEL_BACKEND_URL", DEFAULT_BACKEND_URL),
        backend_token: optional("FUEL_BACKEND_TOKEN").unwrap_or_default(),
        table_id,
        page_size: parse_u32("FUEL_PAGE_SIZE", "100")?,
        max_pages: parse_u32("FUEL_MAX_PAGES", "50")?,
        cache_ttl: parse_secs("FUEL_CACHE_TTL_SECS", "300")?,
        fallback_ttl: parse_secs("FUEL_FALLBACK_TTL_SECS", "30")?,
        cache_path: optional("FUEL_CACHE_PATH").map(PathBuf::from),
        realtime_url: optional("FUEL_REALTIME_URL"),
        regions_path: optional("FUEL_REGIONS_PATH").map(PathBuf::from),
        field_map,
        mock_data,
        bind_addr,
    })
}

/// Parse `field_123=lat,field_124=lng,field_130=fuel:diesel`.
fn parse_field_map(raw: &str) -> Result<Vec<(Field, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, field) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected key=field, got {entry:?}"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("empty column key in {entry:?}"));
            }
            Ok((field.parse::<Field>()?, key.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    fn full_env<'a>() -> HashMap<&'a str, &'a str> {
        let mut m = HashMap::new();
        m.insert("FUEL_TABLE_ID", "4242");
        m
    }

    #[test]
    fn defaults_with_table_id_only() {
        let map = full_env();
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();

        assert_eq!(cfg.backend_url, "https://api.baserow.io");
        assert_eq!(cfg.backend_token, "");
        assert_eq!(cfg.table_id, Some(4242));
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.max_pages, 50);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.fallback_ttl, Duration::from_secs(30));
        assert!(cfg.cache_path.is_none());
        assert!(cfg.realtime_url.is_none());
        assert!(cfg.regions_path.is_none());
        assert!(cfg.field_map.is_empty());
        assert!(cfg.mock_data.is_none());
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn table_id_required_without_mock() {
        let map = HashMap::new();
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "FUEL_TABLE_ID"),
            "expected MissingEnvVar(FUEL_TABLE_ID), got: {result:?}"
        );
    }

    #[test]
    fn mock_mode_needs_no_table() {
        let mut map = HashMap::new();
        map.insert("FUEL_MOCK_DATA", "./data/mock.json");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();

        assert!(cfg.table_id.is_none());
        assert!(cfg.backend_client_config().is_none());
    }

    #[test]
    fn empty_value_counts_as_unset() {
        let mut map = full_env();
        map.insert("FUEL_REALTIME_URL", "  ");
        map.insert("FUEL_PAGE_SIZE", "");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();

        assert!(cfg.realtime_url.is_none());
        assert_eq!(cfg.page_size, 100);
    }

    #[test]
    fn invalid_numbers_rejected() {
        for var in ["FUEL_TABLE_ID", "FUEL_PAGE_SIZE", "FUEL_MAX_PAGES", "FUEL_CACHE_TTL_SECS"] {
            let mut map = full_env();
            map.insert(var, "many");
            let result = build_app_config(lookup_from_map(&map));
            assert!(
                matches!(result, Err(ConfigError::InvalidEnvVar { var: ref v, .. }) if v == var),
                "expected InvalidEnvVar({var}), got: {result:?}"
            );
        }
    }

    #[test]
    fn zero_page_size_rejected() {
        let mut map = full_env();
        map.insert("FUEL_PAGE_SIZE", "0");
        assert!(build_app_config(lookup_from_map(&map)).is_err());
    }

    #[test]
    fn invalid_bind_addr_rejected() {
        let mut map = full_env();
        map.insert("FUEL_BIND_ADDR", "not-a-socket-addr");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "FUEL_BIND_ADDR"),
            "expected InvalidEnvVar(FUEL_BIND_ADDR), got: {result:?}"
        );
    }

    #[test]
    fn field_map_parsed() {
        let mut map = full_env();
        map.insert("FUEL_FIELD_MAP", "field_123=lat, field_124=lng,field_130=fuel:Diesel,");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();

        assert_eq!(
            cfg.field_map,
            vec![
                (Field::Lat, "field_123".to_string()),
                (Field::Lng, "field_124".to_string()),
                (Field::Fuel("diesel".to_string()), "field_130".to_string()),
            ]
        );
    }

    #[test]
    fn bad_field_map_rejected() {
        for raw in ["field_1", "=lat", "field_1=altitude"] {
            let mut map = full_env();
            map.insert("FUEL_FIELD_MAP", raw);
            let result = build_app_config(lookup_from_map(&map));
            assert!(
                matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "FUEL_FIELD_MAP"),
                "expected InvalidEnvVar(FUEL_FIELD_MAP) for {raw:?}, got: {result:?}"
            );
        }
    }

    #[test]
    fn component_configs() {
        let mut map = full_env();
        map.insert("FUEL_BACKEND_URL", "http://localhost:9000/");
        map.insert("FUEL_BACKEND_TOKEN", "secret");
        map.insert("FUEL_PAGE_SIZE", "25");
        map.insert("FUEL_CACHE_TTL_SECS", "60");
        map.insert("FUEL_CACHE_PATH", "/tmp/fuel/snapshot.json");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();

        let client = cfg.backend_client_config().unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
        assert_eq!(client.token, "secret");
        assert_eq!(client.table_id, 4242);

        assert_eq!(cfg.pagination_config().page_size, 25);

        let store = cfg.store_config();
        assert_eq!(store.ttl, Duration::from_secs(60));
        assert_eq!(store.persist_path, Some(PathBuf::from("/tmp/fuel/snapshot.json")));
    }
}
