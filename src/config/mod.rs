//! Configuration module for the POI annotator.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::AppError;
use crate::geometry::{MapFrame, Point, Size, ZoomBounds, SCALE_FACTOR};
use crate::models::Categories;

/// Which persistence backend serves the store contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Two flat JSON files (approved and draft)
    File,
    /// A SQLite database
    Sqlite,
    /// Process memory; nothing survives a restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "json" => Ok(StoreBackend::File),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Map calibration and camera limits shared by the server and the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    pub frame: MapFrame,
    pub zoom_bounds: ZoomBounds,
    pub default_zoom: f64,
    /// Screen pixels, per axis, within which pins count as stacked.
    pub overlap_threshold: f64,
    pub categories: Categories,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            frame: MapFrame::default(),
            zoom_bounds: ZoomBounds::default(),
            default_zoom: 0.5,
            overlap_threshold: 12.0,
            categories: Categories::default(),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    pub store_backend: StoreBackend,
    /// Directory holding `pois.json` and `pois-draft.json`
    pub data_dir: PathBuf,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Front-end assets served at `/`
    pub static_dir: PathBuf,
    /// Capability granting elevated permission; unset disables it
    pub admin_key: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub view: ViewSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_addr = parse_var(&lookup, "POI_BIND_ADDR", "127.0.0.1:8080".parse::<SocketAddr>())?;
        let store_backend = parse_var(&lookup, "POI_STORE", Ok::<_, String>(StoreBackend::File))?;

        let data_dir = string_or("POI_DATA_DIR", "./pois").into();
        let db_path = string_or("POI_DB_PATH", "./data/pois.sqlite").into();
        let static_dir = string_or("POI_STATIC_DIR", "./public").into();
        let admin_key = lookup("POI_ADMIN_KEY").filter(|k| !k.trim().is_empty());
        let log_level = string_or("POI_LOG_LEVEL", "info");

        let map_width: f64 = parse_var(&lookup, "POI_MAP_WIDTH", Ok::<_, String>(2000.0))?;
        let map_height: f64 = parse_var(&lookup, "POI_MAP_HEIGHT", Ok::<_, String>(1430.0))?;
        let offset_x: f64 = parse_var(&lookup, "POI_OFFSET_X", Ok::<_, String>(200.0))?;
        let offset_y: f64 = parse_var(&lookup, "POI_OFFSET_Y", Ok::<_, String>(300.0))?;
        let scale_factor: f64 = parse_var(&lookup, "POI_SCALE_FACTOR", Ok::<_, String>(SCALE_FACTOR))?;
        let frame = MapFrame::new(
            Size::new(map_width, map_height),
            Point::new(offset_x, offset_y),
            scale_factor,
        )?;

        let min_zoom: f64 = parse_var(&lookup, "POI_MIN_ZOOM", Ok::<_, String>(0.2))?;
        let max_zoom: f64 = parse_var(&lookup, "POI_MAX_ZOOM", Ok::<_, String>(4.0))?;
        let zoom_bounds = ZoomBounds::new(min_zoom, max_zoom)?;
        let default_zoom: f64 = parse_var(&lookup, "POI_DEFAULT_ZOOM", Ok::<_, String>(0.5))?;
        if !zoom_bounds.contains(default_zoom) {
            return Err(AppError::Validation(format!(
                "POI_DEFAULT_ZOOM {} is outside [{}, {}]",
                default_zoom,
                zoom_bounds.min(),
                zoom_bounds.max()
            )));
        }

        let overlap_threshold: f64 = parse_var(&lookup, "POI_OVERLAP_THRESHOLD", Ok::<_, String>(12.0))?;
        if !overlap_threshold.is_finite() || overlap_threshold < 0.0 {
            return Err(AppError::Validation(format!(
                "POI_OVERLAP_THRESHOLD {} must be a non-negative number",
                overlap_threshold
            )));
        }

        let categories = lookup("POI_CATEGORIES")
            .map(|raw| Categories::parse_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            store_backend,
            data_dir,
            db_path,
            static_dir,
            admin_key,
            log_level,
            view: ViewSettings {
                frame,
                zoom_bounds,
                default_zoom,
                overlap_threshold,
                categories,
            },
        })
    }
}

/// Parse `key` if set, otherwise fall back to `default`.
fn parse_var<T, E, F>(lookup: &F, key: &str, default: Result<T, E>) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid {} '{}': {}", key, raw, e))),
        None => default.map_err(|e| AppError::Internal(format!("Bad default for {}: {}", key, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = from_pairs(&[]).unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.store_backend, StoreBackend::File);
        assert_eq!(config.data_dir, PathBuf::from("./pois"));
        assert_eq!(config.db_path, PathBuf::from("./data/pois.sqlite"));
        assert!(config.admin_key.is_none());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.view, ViewSettings::default());
        assert_eq!(config.view.frame.scale_factor, 1.664);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("POI_STORE", "sqlite"),
            ("POI_ADMIN_KEY", "s3cret"),
            ("POI_MAP_WIDTH", "4096"),
            ("POI_SCALE_FACTOR", "2.5"),
            ("POI_CATEGORIES", "Camp, Cave"),
        ])
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.admin_key.as_deref(), Some("s3cret"));
        assert_eq!(config.view.frame.width, 4096.0);
        assert_eq!(config.view.frame.scale_factor, 2.5);
        assert_eq!(config.view.categories.names(), ["camp", "cave"]);
    }

    #[test]
    fn test_blank_admin_key_is_unset() {
        let config = from_pairs(&[("POI_ADMIN_KEY", "  ")]).unwrap();
        assert!(config.admin_key.is_none());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert!(matches!(from_pairs(&[("POI_BIND_ADDR", "nope")]), Err(AppError::Validation(_))));
        assert!(matches!(from_pairs(&[("POI_STORE", "redis")]), Err(AppError::Validation(_))));
        assert!(matches!(from_pairs(&[("POI_SCALE_FACTOR", "0")]), Err(AppError::Validation(_))));
        assert!(matches!(from_pairs(&[("POI_MIN_ZOOM", "5")]), Err(AppError::Validation(_))));
        assert!(matches!(from_pairs(&[("POI_DEFAULT_ZOOM", "9")]), Err(AppError::Validation(_))));
    }
}
