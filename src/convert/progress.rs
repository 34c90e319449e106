//! Conversion progress reporting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A progress milestone of a forward conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionProgress {
    /// 0 to 100
    pub percent: u8,
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

impl ConversionProgress {
    pub fn new(percent: u8, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            stage: stage.into(),
            message: message.into(),
            current: None,
            total: None,
        }
    }

    /// Milestone with an item counter.
    pub fn with_count(mut self, current: u32, total: u32) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }

    pub fn complete() -> Self {
        Self::new(100, "complete", "Conversion complete")
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

impl fmt::Display for ConversionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}%] {} - {}", self.percent, self.stage, self.message)?;
        if let (Some(current), Some(total)) = (self.current, self.total) {
            write!(f, " ({}/{})", current, total)?;
        }
        Ok(())
    }
}

/// Percent for item `current` of `total` spread over `start..end`.
pub(crate) fn ranged_percent(start: u8, end: u8, current: u32, total: u32) -> u8 {
    if total == 0 {
        return end;
    }
    let span = f64::from(end.saturating_sub(start));
    let fraction = f64::from(current.min(total)) / f64::from(total);
    start + (span * fraction) as u8
}

/// Logs every milestone before handing it on.
pub(crate) struct ProgressReporter<'a> {
    sink: &'a dyn Fn(ConversionProgress),
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn Fn(ConversionProgress)) -> Self {
        Self { sink }
    }

    pub fn report(&self, progress: ConversionProgress) {
        log::info!("Progress: {}", progress);
        (self.sink)(progress);
    }

    pub fn stage(&self, percent: u8, stage: &str, message: &str) {
        self.report(ConversionProgress::new(percent, stage, message));
    }
}
