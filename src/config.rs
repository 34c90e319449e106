//! Converter options and configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that turns on document model analysis logging.
pub const DEBUG_ANALYSIS_ENV: &str = "PDFJSON_DEBUG_ANALYSIS";

/// Options for the PDF <-> JSON converter.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Byte budget for cached document bytes held in memory
    pub cache_budget_bytes: u64,

    /// Idle window after which a cached job is cleared
    pub cache_ttl: Duration,

    /// Directory for cache spill files (system temp dir when `None`)
    pub spill_dir: Option<PathBuf>,

    /// Drop serialized font dictionaries when a usable program exists,
    /// and omit stream bytes from annotation, form field and resource payloads
    pub lightweight: bool,

    /// Leave image elements out of the forward conversion
    pub lazy_images: bool,

    /// CFF to TrueType conversion
    pub cff: CffConverterConfig,

    /// Ghostscript pre-pass
    pub normalization: FontNormalizationConfig,

    /// Directory holding the fallback font files
    pub fallback_font_dir: PathBuf,

    /// Whether to scan pages in parallel
    pub parallel: bool,

    /// Log duplicate payload and size analysis of produced models
    pub debug_analysis: bool,
}

impl ConverterConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `PDFJSON_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse::<u64>("PDFJSON_CACHE_BUDGET_BYTES") {
            config.cache_budget_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("PDFJSON_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(v);
        }
        if let Ok(v) = std::env::var("PDFJSON_SPILL_DIR") {
            config.spill_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_flag("PDFJSON_LIGHTWEIGHT") {
            config.lightweight = v;
        }
        if let Some(v) = env_flag("PDFJSON_LAZY_IMAGES") {
            config.lazy_images = v;
        }
        if let Some(v) = env_flag("PDFJSON_CFF_ENABLED") {
            config.cff.enabled = v;
        }
        if let Ok(v) = std::env::var("PDFJSON_CFF_METHOD") {
            config.cff.method = CffMethod::parse(&v);
        }
        if let Ok(v) = std::env::var("PDFJSON_CFF_PYTHON") {
            config.cff.python_command = v;
        }
        if let Ok(v) = std::env::var("PDFJSON_CFF_SCRIPT") {
            config.cff.python_script = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PDFJSON_FONTFORGE") {
            config.cff.fontforge_command = v;
        }
        if let Some(v) = env_flag("PDFJSON_NORMALIZE") {
            config.normalization.enabled = v;
        }
        if let Ok(v) = std::env::var("PDFJSON_GHOSTSCRIPT") {
            config.normalization.ghostscript_command = v;
        }
        if let Ok(v) = std::env::var("PDFJSON_FALLBACK_FONT_DIR") {
            config.fallback_font_dir = PathBuf::from(v);
        }
        if let Some(v) = env_flag("PDFJSON_PARALLEL") {
            config.parallel = v;
        }
        config
    }

    /// Set the cache byte budget.
    pub fn with_cache_budget(mut self, bytes: u64) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    /// Set the cache idle window.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the spill directory.
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Enable lightweight output.
    pub fn lightweight(mut self) -> Self {
        self.lightweight = true;
        self
    }

    /// Enable or disable lazy images.
    pub fn with_lazy_images(mut self, lazy: bool) -> Self {
        self.lazy_images = lazy;
        self
    }

    /// Set CFF converter options.
    pub fn with_cff(mut self, cff: CffConverterConfig) -> Self {
        self.cff = cff;
        self
    }

    /// Set normalization options.
    pub fn with_normalization(mut self, normalization: FontNormalizationConfig) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set the fallback font directory.
    pub fn with_fallback_font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_font_dir = dir.into();
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Enable or disable debug analysis.
    pub fn with_debug_analysis(mut self, enabled: bool) -> Self {
        self.debug_analysis = enabled;
        self
    }

    /// Directory for spill files.
    pub fn spill_dir_or_temp(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            cache_budget_bytes: 512 * 1024 * 1024,
            cache_ttl: Duration::from_secs(30 * 60),
            spill_dir: None,
            lightweight: false,
            lazy_images: false,
            cff: CffConverterConfig::default(),
            normalization: FontNormalizationConfig::default(),
            fallback_font_dir: PathBuf::from("/usr/share/fonts/pdfjson"),
            parallel: true,
            debug_analysis: env_flag(DEBUG_ANALYSIS_ENV).unwrap_or(false),
        }
    }
}

/// External tool used for CFF to TrueType conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CffMethod {
    /// Python script (fontTools)
    #[default]
    Python,
    /// FontForge scripting
    FontForge,
}

impl CffMethod {
    /// Parse a method name; unknown names select Python.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "fontforge" => CffMethod::FontForge,
            _ => CffMethod::Python,
        }
    }
}

/// Options for CFF to TrueType conversion.
#[derive(Debug, Clone)]
pub struct CffConverterConfig {
    pub enabled: bool,
    pub method: CffMethod,
    pub python_command: String,
    pub python_script: PathBuf,
    pub fontforge_command: String,
}

impl Default for CffConverterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: CffMethod::Python,
            python_command: "/opt/venv/bin/python3".to_string(),
            python_script: PathBuf::from("/scripts/convert_cff_to_ttf.py"),
            fontforge_command: "fontforge".to_string(),
        }
    }
}

impl CffConverterConfig {
    /// Conversion switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Options for the Ghostscript normalization pre-pass.
#[derive(Debug, Clone)]
pub struct FontNormalizationConfig {
    pub enabled: bool,
    pub ghostscript_command: String,
}

impl Default for FontNormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ghostscript_command: "gs".to_string(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    Some(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    ))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConverterConfig::new()
            .with_cache_budget(1024)
            .with_cache_ttl(Duration::from_secs(5))
            .lightweight()
            .sequential();

        assert_eq!(config.cache_budget_bytes, 1024);
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert!(config.lightweight);
        assert!(!config.parallel);
    }

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.cache_budget_bytes, 512 * 1024 * 1024);
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert!(config.cff.enabled);
        assert_eq!(config.cff.method, CffMethod::Python);
        assert!(!config.normalization.enabled);
        assert_eq!(config.normalization.ghostscript_command, "gs");
    }

    #[test]
    fn test_cff_method_parse() {
        assert_eq!(CffMethod::parse("FontForge"), CffMethod::FontForge);
        assert_eq!(CffMethod::parse("python"), CffMethod::Python);
        assert_eq!(CffMethod::parse("other"), CffMethod::Python);
    }
}
