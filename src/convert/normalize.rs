//! Ghostscript font normalization pre-pass.

use crate::config::FontNormalizationConfig;
use crate::font::{is_command_available, run_tool};
use std::process::Command;
use std::sync::OnceLock;

/// Rewrites input PDFs through Ghostscript so that every font is embedded
/// and compressed. Any failure leaves the input as it was.
#[derive(Debug)]
pub struct FontNormalizer {
    config: FontNormalizationConfig,
    available: OnceLock<bool>,
}

impl FontNormalizer {
    pub fn new(config: FontNormalizationConfig) -> Self {
        Self {
            config,
            available: OnceLock::new(),
        }
    }

    /// Enabled and the Ghostscript binary was found.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = self.config.enabled && is_command_available(&self.config.ghostscript_command);
            if self.config.enabled && !found {
                log::warn!(
                    "Font normalization enabled but {} was not found",
                    self.config.ghostscript_command
                );
            }
            found
        })
    }

    /// Normalized copy of `data`, or `None` when normalization did not run
    /// or failed.
    pub fn normalize(&self, data: &[u8]) -> Option<Vec<u8>> {
        if !self.is_available() || data.is_empty() {
            return None;
        }
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                log::warn!("Font normalization skipped, no temp dir: {}", e);
                return None;
            }
        };
        let input = dir.path().join("input.pdf");
        let output = dir.path().join("normalized.pdf");
        if let Err(e) = std::fs::write(&input, data) {
            log::warn!("Font normalization skipped: {}", e);
            return None;
        }

        let mut command = Command::new(&self.config.ghostscript_command);
        command
            .args([
                "-sDEVICE=pdfwrite",
                "-dCompatibilityLevel=1.7",
                "-dPDFSETTINGS=/prepress",
                "-dEmbedAllFonts=true",
                "-dSubsetFonts=true",
                "-dCompressFonts=true",
                "-dNOPAUSE",
                "-dBATCH",
                "-dQUIET",
            ])
            .arg("-o")
            .arg(&output)
            .arg("-c")
            .arg("<</NeverEmbed[]>> setdistillerparams")
            .arg("-f")
            .arg(&input);

        match run_tool(command, &output, "ghostscript") {
            Ok(normalized) => {
                log::info!(
                    "Normalized fonts with Ghostscript ({} -> {} bytes)",
                    data.len(),
                    normalized.len()
                );
                Some(normalized)
            }
            Err(e) => {
                log::warn!("Font normalization failed, using original PDF: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_normalizer_returns_none() {
        let normalizer = FontNormalizer::new(FontNormalizationConfig::default());
        assert!(!normalizer.is_available());
        assert!(normalizer.normalize(b"%PDF-1.7").is_none());
    }

    #[test]
    fn test_missing_ghostscript_returns_none() {
        let normalizer = FontNormalizer::new(FontNormalizationConfig {
            enabled: true,
            ghostscript_command: "/nonexistent/pdfjson-gs".to_string(),
        });
        assert!(!normalizer.is_available());
        assert!(normalizer.normalize(b"%PDF-1.7").is_none());
    }
}
