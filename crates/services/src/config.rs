//! Trainer configuration loaded from TOML.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use sign_core::model::{LabelMap, Symbol, SymbolCatalog};
use sign_core::{ProgressSettings, StabilitySettings};

use crate::capture::JpegFrameEncoder;
use crate::connection::DEFAULT_RECONNECT_DELAY;
use crate::error::{ConfigError, EndpointError};
use crate::protocol::{self, Endpoint};
use crate::sampler::SamplerSettings;

pub const DEFAULT_PAGE_URL: &str = "http://localhost:8001/";
pub const DEFAULT_PROFILE: &str = "default";

/// Raw configuration as written by the user. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    pub page_url: String,
    /// Explicit `ws://`/`wss://` URL; derived from `page_url` when absent.
    pub endpoint: Option<String>,
    pub profile: String,
    pub symbols: Vec<String>,
    /// Service label -> catalog symbol.
    pub labels: BTreeMap<String, String>,
    pub stability_window: u32,
    pub confidence_threshold: f32,
    pub required_attempts: u32,
    pub sample_period_ms: u64,
    pub reconnect_delay_ms: u64,
    pub jpeg_quality: u8,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            page_url: DEFAULT_PAGE_URL.to_owned(),
            endpoint: None,
            profile: DEFAULT_PROFILE.to_owned(),
            symbols: ["hello", "thanks", "yes", "no"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            labels: BTreeMap::new(),
            stability_window: StabilitySettings::DEFAULT_WINDOW,
            confidence_threshold: StabilitySettings::DEFAULT_THRESHOLD,
            required_attempts: ProgressSettings::DEFAULT_REQUIRED_ATTEMPTS,
            sample_period_ms: SamplerSettings::DEFAULT_PERIOD.as_millis() as u64,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            jpeg_quality: JpegFrameEncoder::DEFAULT_QUALITY,
            frame_width: SamplerSettings::DEFAULT_WIDTH,
            frame_height: SamplerSettings::DEFAULT_HEIGHT,
        }
    }
}

/// Validated settings, ready to wire into the session.
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub page_url: Url,
    pub endpoint: Endpoint,
    pub profile: String,
    pub catalog: SymbolCatalog,
    pub labels: LabelMap,
    pub stability: StabilitySettings,
    pub progress: ProgressSettings,
    pub sampler: SamplerSettings,
    pub reconnect_delay: Duration,
    pub jpeg_quality: u8,
}

impl TrainerConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Toml` for syntax errors or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every field and build typed settings.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<TrainerSettings, ConfigError> {
        let page_url = protocol::parse_url(&self.page_url)?;
        if !matches!(page_url.scheme(), "http" | "https") {
            return Err(EndpointError::UnsupportedScheme(page_url.scheme().to_owned()).into());
        }
        let endpoint = match self.endpoint.as_deref() {
            Some(raw) => Endpoint::parse(raw)?,
            None => Endpoint::from_page_url(&self.page_url)?,
        };

        let profile = self.profile.trim();
        if profile.is_empty() {
            return Err(ConfigError::BlankProfile);
        }

        let catalog = SymbolCatalog::from_names(self.symbols.iter().map(String::as_str))?;

        let mut labels = LabelMap::new();
        for (raw, display) in &self.labels {
            let symbol = Symbol::new(display.as_str()).map_err(|source| ConfigError::Label {
                raw: raw.clone(),
                source,
            })?;
            labels.insert(raw.as_str(), symbol);
        }

        let stability = StabilitySettings::new(self.stability_window, self.confidence_threshold)?;
        let progress = ProgressSettings::new(self.required_attempts)?;

        if self.sample_period_ms == 0 {
            return Err(ConfigError::InvalidSamplePeriod);
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::InvalidFrameSize {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidJpegQuality(self.jpeg_quality));
        }

        Ok(TrainerSettings {
            page_url,
            endpoint,
            profile: profile.to_owned(),
            catalog,
            labels,
            stability,
            progress,
            sampler: SamplerSettings {
                period: Duration::from_millis(self.sample_period_ms),
                width: self.frame_width,
                height: self.frame_height,
            },
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            jpeg_quality: self.jpeg_quality,
        })
    }
}
