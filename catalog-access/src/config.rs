//! Service configuration: catalog endpoints, HTTP timeout and cross-match
//! tunables.
//!
//! Configuration is JSON with durations written as strings such as `"500ms"`
//! or `"2m"`. Every field has a default, so a partial file only overrides
//! what it names.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogKey;
use crate::crossmatch::CrossMatchSettings;

pub const GAIA_TAP_URL: &str = "https://gea.esac.esa.int/tap-server/tap";
pub const SIMBAD_TAP_URL: &str = "https://simbad.cds.unistra.fr/simbad/sim-tap";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parse a duration with an optional unit suffix (us, ms, s, m, h).
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, "ms")
    } else if let Some(n) = s.strip_suffix("us") {
        (n, "us")
    } else if let Some(n) = s.strip_suffix('s') {
        (n, "s")
    } else if let Some(n) = s.strip_suffix('h') {
        (n, "h")
    } else if let Some(n) = s.strip_suffix('m') {
        (n, "m")
    } else {
        (s, "s")
    };

    let value: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid numeric value: {num_str}"))?;

    if !value.is_finite() || value < 0.0 {
        return Err(format!("Invalid duration: {s}"));
    }

    Ok(match unit {
        "us" => Duration::from_nanos((value * 1e3).round() as u64),
        "ms" => Duration::from_nanos((value * 1e6).round() as u64),
        "m" => Duration::from_secs_f64(value * 60.0),
        "h" => Duration::from_secs_f64(value * 3600.0),
        _ => Duration::from_secs_f64(value),
    })
}

/// Duration read from and written as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DurationText(pub Duration);

impl FromStr for DurationText {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(DurationText)
    }
}

impl TryFrom<String> for DurationText {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DurationText> for String {
    fn from(d: DurationText) -> Self {
        d.to_string()
    }
}

impl fmt::Display for DurationText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        if self.0.subsec_nanos() % 1_000_000 != 0 {
            write!(f, "{}us", self.0.as_micros())
        } else if millis % 1000 != 0 {
            write!(f, "{millis}ms")
        } else {
            write!(f, "{}s", self.0.as_secs())
        }
    }
}

impl From<Duration> for DurationText {
    fn from(d: Duration) -> Self {
        DurationText(d)
    }
}

/// TAP base URL of each catalog. A catalog without one is not supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogEndpoints {
    pub gaia: Option<String>,
    pub simbad: Option<String>,
    pub sdss: Option<String>,
    pub stellaris: Option<String>,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            gaia: Some(GAIA_TAP_URL.to_string()),
            simbad: Some(SIMBAD_TAP_URL.to_string()),
            sdss: None,
            stellaris: None,
        }
    }
}

impl CatalogEndpoints {
    pub fn url(&self, key: CatalogKey) -> Option<&str> {
        match key {
            CatalogKey::Gaia => self.gaia.as_deref(),
            CatalogKey::Simbad => self.simbad.as_deref(),
            CatalogKey::Sdss => self.sdss.as_deref(),
            CatalogKey::Stellaris => self.stellaris.as_deref(),
        }
        .filter(|url| !url.trim().is_empty())
    }
}

/// Cross-match section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossMatchConfig {
    /// Catalog every cross-match runs against.
    pub target: CatalogKey,
    pub match_radius_deg: f64,
    pub poll_interval: DurationText,
    pub job_timeout: DurationText,
    pub upload_table: String,
}

impl Default for CrossMatchConfig {
    fn default() -> Self {
        let settings = CrossMatchSettings::default();
        Self {
            target: CatalogKey::Simbad,
            match_radius_deg: settings.match_radius_deg,
            poll_interval: settings.poll_interval.into(),
            job_timeout: settings.job_timeout.into(),
            upload_table: settings.upload_table,
        }
    }
}

impl CrossMatchConfig {
    pub fn settings(&self) -> CrossMatchSettings {
        CrossMatchSettings {
            match_radius_deg: self.match_radius_deg,
            poll_interval: self.poll_interval.0,
            job_timeout: self.job_timeout.0,
            upload_table: self.upload_table.clone(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoints: CatalogEndpoints,
    /// Upper bound for each HTTP exchange.
    pub http_timeout: DurationText,
    pub crossmatch: CrossMatchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoints: CatalogEndpoints::default(),
            http_timeout: DurationText(Duration::from_secs(60)),
            crossmatch: CrossMatchConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load and validate configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: ServiceConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let radius = self.crossmatch.match_radius_deg;
        if !(radius.is_finite() && radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "match_radius_deg must be positive, got {radius}"
            )));
        }
        if self.crossmatch.upload_table.trim().is_empty() {
            return Err(ConfigError::Invalid("upload_table must not be empty".into()));
        }
        if self.crossmatch.poll_interval.0.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        for key in CatalogKey::ALL {
            if let Some(url) = self.endpoints.url(key) {
                url::Url::parse(url)
                    .map_err(|e| ConfigError::Invalid(format!("{key} URL {url}: {e}")))?;
            }
        }
        if self.endpoints.url(self.crossmatch.target).is_none() {
            log::warn!(
                "Cross-match target {} has no endpoint; cross-matching is unavailable",
                self.crossmatch.target
            );
        }
        Ok(())
    }
}
