//! CFF to TrueType conversion through external tools.

use crate::config::{CffConverterConfig, CffMethod};
use crate::error::{Error, Result};
use base64::Engine;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

const FONTFORGE_SCRIPT: &str = "Open($1); ScaleToEm(1000); SelectWorthOutputting(); \
SetFontOrder(2); Reencode(\"unicode\"); RoundToInt(); RemoveOverlap(); Simplify(); \
CorrectDirection(); Generate($2, \"\", 4+16+32); Close(); Quit()";

/// Converts compact font programs with the configured external tool.
///
/// Tool availability is probed on first use. Every failure yields `None`.
#[derive(Debug)]
pub struct CffConverter {
    config: CffConverterConfig,
    python_available: OnceLock<bool>,
    fontforge_available: OnceLock<bool>,
}

impl CffConverter {
    pub fn new(config: CffConverterConfig) -> Self {
        Self {
            config,
            python_available: OnceLock::new(),
            fontforge_available: OnceLock::new(),
        }
    }

    /// A converter that never runs anything.
    pub fn disabled() -> Self {
        Self::new(CffConverterConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn python_available(&self) -> bool {
        *self
            .python_available
            .get_or_init(|| self.config.enabled && is_command_available(&self.config.python_command))
    }

    fn fontforge_available(&self) -> bool {
        *self.fontforge_available.get_or_init(|| {
            self.config.enabled && is_command_available(&self.config.fontforge_command)
        })
    }

    /// Convert with the configured method.
    ///
    /// `to_unicode` is the base64 Unicode map handed to the python script.
    pub fn convert_to_truetype(&self, data: &[u8], to_unicode: Option<&str>) -> Option<Vec<u8>> {
        if !self.config.enabled || data.is_empty() {
            log::debug!("CFF conversion skipped (enabled: {})", self.config.enabled);
            return None;
        }
        match self.config.method {
            CffMethod::Python => {
                if !self.python_available() {
                    log::debug!("Python CFF converter not available");
                    return None;
                }
                self.convert_with_python(data, to_unicode)
            }
            CffMethod::FontForge => self.convert_with_fontforge(data),
        }
    }

    fn convert_with_python(&self, data: &[u8], to_unicode: Option<&str>) -> Option<Vec<u8>> {
        if self.config.python_command.trim().is_empty()
            || self.config.python_script.as_os_str().is_empty()
        {
            return None;
        }
        let dir = tempfile::tempdir().ok()?;
        let input = dir.path().join("input.cff");
        let output = dir.path().join("output.otf");
        std::fs::write(&input, data).ok()?;

        let mut command = Command::new(&self.config.python_command);
        command
            .arg(&self.config.python_script)
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output);

        if let Some(encoded) = to_unicode {
            let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::debug!("Failed to decode ToUnicode data for CFF conversion: {}", e);
                    return None;
                }
            };
            let path = dir.path().join("mapping.tounicode");
            std::fs::write(&path, bytes).ok()?;
            command.arg("--to-unicode").arg(&path);
        }

        run_and_read(command, &output, "python")
    }

    /// Convert with FontForge regardless of the configured method.
    pub fn convert_with_fontforge(&self, data: &[u8]) -> Option<Vec<u8>> {
        if !self.fontforge_available() || data.is_empty() {
            log::debug!("FontForge CFF converter not available");
            return None;
        }
        let dir = tempfile::tempdir().ok()?;
        let input = dir.path().join("input.cff");
        let output = dir.path().join("output.ttf");
        std::fs::write(&input, data).ok()?;

        let mut command = Command::new(&self.config.fontforge_command);
        command
            .arg("-lang=ff")
            .arg("-c")
            .arg(FONTFORGE_SCRIPT)
            .arg(&input)
            .arg(&output);
        run_and_read(command, &output, "fontforge")
    }
}

fn run_and_read(command: Command, output: &Path, label: &str) -> Option<Vec<u8>> {
    match run_tool(command, output, label) {
        Ok(data) => Some(data),
        Err(e) => {
            log::warn!("CFF conversion failed: {}", e);
            None
        }
    }
}

/// Run an external tool and read back the file it was told to write.
pub(crate) fn run_tool(mut command: Command, output: &Path, label: &str) -> Result<Vec<u8>> {
    let result = command
        .output()
        .map_err(|e| Error::ExternalTool(format!("{} could not start: {}", label, e)))?;
    if !result.status.success() {
        return Err(Error::ExternalTool(format!(
            "{} exited with {}: {}",
            label,
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }
    let data = std::fs::read(output)
        .map_err(|_| Error::ExternalTool(format!("{} produced no output file", label)))?;
    if data.is_empty() {
        return Err(Error::ExternalTool(format!("{} returned empty output", label)));
    }
    log::debug!("{} produced {} bytes", label, data.len());
    Ok(data)
}

/// Probe for a command with `which` (or `where` on Windows).
pub fn is_command_available(command: &str) -> bool {
    if command.trim().is_empty() {
        return false;
    }
    if Path::new(command).is_absolute() {
        return Path::new(command).is_file();
    }
    let probe = if cfg!(windows) { "where" } else { "which" };
    Command::new(probe)
        .arg(command)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
