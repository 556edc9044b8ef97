use anyhow::{bail, Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Ten years; longer intervals overflow `Instant` arithmetic downstream.
const MAX_DURATION_SECS: f64 = 315_360_000.0;
/// A thousand years of capture history.
const MAX_AGE_DAYS: f64 = 365_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path (or `:memory:`). Required.
    #[serde(default)]
    pub path: String,
    /// Drop and recreate both event tables before the pipeline starts.
    #[serde(default)]
    pub reset_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub enabled: bool,
    pub idle_timeout_secs: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_timeout_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Identity-group prefixes whose posture is monitored. Empty with an
    /// empty `identities` list means every identity is monitored.
    pub groups: Vec<String>,
    pub identities: Vec<String>,
    pub grace_secs: f64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            identities: Vec::new(),
            grace_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertOutput {
    /// Tone through the default audio output device.
    Speaker,
    /// Warn-level log line per beep; for headless machines.
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled: bool,
    pub min_gap_secs: f64,
    pub beep_count: u32,
    pub beep_interval_secs: f64,
    pub output: AlertOutput,
    pub tone_hz: f32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_gap_secs: 10.0,
            beep_count: 2,
            beep_interval_secs: 0.5,
            output: AlertOutput::Log,
            tone_hz: 880.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub max_rows: Option<u64>,
    pub max_age_days: Option<f64>,
    pub poll_interval_secs: f64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_rows: None,
            max_age_days: None,
            poll_interval_secs: 600.0,
        }
    }
}

/// Thresholds handed to the posture assessor. Both are required.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PostureThresholds {
    pub nose_drop: f64,
    pub neck_angle: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityCaptureSettings {
    pub enabled: bool,
    pub root: PathBuf,
    pub groups: Vec<String>,
    pub identities: Vec<String>,
    pub date_folder_format: String,
    pub time_format: String,
    pub extension: String,
}

impl Default for IdentityCaptureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("data/snapshots"),
            groups: Vec::new(),
            identities: Vec::new(),
            date_folder_format: "%m%d".into(),
            time_format: "%H%M%S".into(),
            extension: "jpg".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub posture: Option<PostureThresholds>,
    #[serde(default)]
    pub motion: MotionSettings,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub alert: AlertSettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    #[serde(default)]
    pub identity_capture: IdentityCaptureSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(contents).context("failed to parse settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            bail!("database.path must be provided");
        }

        match self.posture {
            None => bail!("posture thresholds (posture.nose_drop, posture.neck_angle) are required"),
            Some(thresholds) => {
                if !thresholds.nose_drop.is_finite() {
                    bail!("posture.nose_drop must be a finite number");
                }
                if !thresholds.neck_angle.is_finite() {
                    bail!("posture.neck_angle must be a finite number");
                }
            }
        }

        ensure_duration("motion.idle_timeout_secs", self.motion.idle_timeout_secs, true)?;
        ensure_duration("monitoring.grace_secs", self.monitoring.grace_secs, false)?;
        ensure_duration("alert.min_gap_secs", self.alert.min_gap_secs, false)?;
        ensure_duration("alert.beep_interval_secs", self.alert.beep_interval_secs, false)?;
        if !(self.alert.tone_hz.is_finite() && self.alert.tone_hz > 0.0) {
            bail!("alert.tone_hz must be greater than zero");
        }
        ensure_duration(
            "retention.poll_interval_secs",
            self.retention.poll_interval_secs,
            true,
        )?;
        if let Some(days) = self.retention.max_age_days {
            if !(days.is_finite() && days > 0.0 && days <= MAX_AGE_DAYS) {
                bail!("retention.max_age_days must be in (0, {MAX_AGE_DAYS}] (got {days})");
            }
        }

        let capture = &self.identity_capture;
        if capture.enabled {
            ensure_strftime("identity_capture.date_folder_format", &capture.date_folder_format)?;
            ensure_strftime("identity_capture.time_format", &capture.time_format)?;
        }

        Ok(())
    }
}

impl MotionSettings {
    pub fn idle_timeout(&self) -> Duration {
        seconds(self.idle_timeout_secs)
    }
}

impl MonitoringSettings {
    pub fn grace(&self) -> Duration {
        seconds(self.grace_secs)
    }

    pub fn group_set(&self) -> HashSet<String> {
        string_set(&self.groups)
    }

    pub fn identity_set(&self) -> HashSet<String> {
        string_set(&self.identities)
    }
}

impl AlertSettings {
    pub fn min_gap(&self) -> Duration {
        seconds(self.min_gap_secs)
    }

    pub fn beep_interval(&self) -> Duration {
        seconds(self.beep_interval_secs)
    }
}

impl RetentionSettings {
    pub fn is_enabled(&self) -> bool {
        self.max_rows.is_some() || self.max_age_days.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        seconds(self.poll_interval_secs)
    }
}

/// Trims entries and drops blanks, matching how hand-edited lists come in.
pub fn string_set(values: &[String]) -> HashSet<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Saturating conversion; `validate` keeps loaded values inside the range.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::from_secs_f64(MAX_DURATION_SECS)
    } else {
        Duration::ZERO
    })
}

fn ensure_duration(field: &str, value: f64, must_be_positive: bool) -> Result<()> {
    if !(value.is_finite() && value >= 0.0 && value <= MAX_DURATION_SECS) {
        bail!("{field} must be between 0 and {MAX_DURATION_SECS} seconds (got {value})");
    }
    if must_be_positive {
        let rounds_to_zero = Duration::try_from_secs_f64(value)
            .map(|duration| duration.is_zero())
            .unwrap_or(true);
        if rounds_to_zero {
            bail!("{field} must be greater than zero (got {value})");
        }
    }
    Ok(())
}

/// Rejects strftime patterns chrono cannot render.
pub fn ensure_strftime(field: &str, pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        bail!("{field} is not a valid strftime pattern: {pattern:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "database": { "path": "deskwatch.sqlite3" },
        "posture": { "nose_drop": 0.12, "neck_angle": 45.0 }
    }"#;

    #[test]
    fn minimal_settings_fill_in_defaults() {
        let settings = Settings::from_json_str(MINIMAL).unwrap();

        assert!(!settings.database.reset_on_start);
        assert!(settings.motion.enabled);
        assert_eq!(settings.motion.idle_timeout(), Duration::from_secs(60));
        assert_eq!(settings.monitoring.grace(), Duration::from_secs(5));
        assert_eq!(settings.alert.beep_count, 2);
        assert_eq!(settings.alert.output, AlertOutput::Log);
        assert!(!settings.retention.is_enabled());
        assert_eq!(settings.retention.poll_interval(), Duration::from_secs(600));
        assert!(!settings.identity_capture.enabled);
    }

    #[test]
    fn missing_database_path_is_rejected() {
        let err = Settings::from_json_str(
            r#"{ "database": {}, "posture": { "nose_drop": 0.1, "neck_angle": 40 } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("database.path"));
    }

    #[test]
    fn missing_posture_thresholds_are_rejected() {
        let err = Settings::from_json_str(r#"{ "database": { "path": "x.db" } }"#).unwrap_err();
        assert!(format!("{err:#}").contains("posture thresholds"));
    }

    #[test]
    fn non_positive_idle_timeout_is_rejected() {
        let err = Settings::from_json_str(
            r#"{
                "database": { "path": "x.db" },
                "posture": { "nose_drop": 0.1, "neck_angle": 40 },
                "motion": { "idle_timeout_secs": 0 }
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("motion.idle_timeout_secs"));
    }

    #[test]
    fn group_lists_are_trimmed_and_blank_entries_dropped() {
        let settings = Settings::from_json_str(
            r#"{
                "database": { "path": "x.db" },
                "posture": { "nose_drop": 0.1, "neck_angle": 40 },
                "monitoring": { "groups": [" child ", "", "teen"] },
                "retention": { "max_rows": 500 }
            }"#,
        )
        .unwrap();

        let groups = settings.monitoring.group_set();
        assert_eq!(groups.len(), 2);
        assert!(groups.contains("child"));
        assert!(groups.contains("teen"));
        assert!(settings.retention.is_enabled());
    }

    fn with_section(section: &str) -> String {
        format!(
            r#"{{
                "database": {{ "path": "x.db" }},
                "posture": {{ "nose_drop": 0.1, "neck_angle": 40 }},
                {section}
            }}"#
        )
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = Settings::from_json_str(&with_section(r#""motion": { "idle_timeout_secs": 1e30 }"#))
            .unwrap_err();
        assert!(err.to_string().contains("motion.idle_timeout_secs"));

        let err = Settings::from_json_str(&with_section(r#""alert": { "min_gap_secs": 1e20 }"#))
            .unwrap_err();
        assert!(err.to_string().contains("alert.min_gap_secs"));
    }

    #[test]
    fn poll_interval_that_rounds_to_zero_is_rejected() {
        let err = Settings::from_json_str(&with_section(
            r#""retention": { "max_rows": 10, "poll_interval_secs": 1e-12 }"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("retention.poll_interval_secs"));
    }

    #[test]
    fn unbounded_max_age_days_is_rejected() {
        let err = Settings::from_json_str(&with_section(r#""retention": { "max_age_days": 1e12 }"#))
            .unwrap_err();
        assert!(err.to_string().contains("retention.max_age_days"));
    }

    #[test]
    fn invalid_snapshot_time_format_is_rejected_when_capture_is_enabled() {
        let err = Settings::from_json_str(&with_section(
            r#""identity_capture": { "enabled": true, "time_format": "%Q" }"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("identity_capture.time_format"));

        assert!(Settings::from_json_str(&with_section(
            r#""identity_capture": { "enabled": false, "time_format": "%Q" }"#,
        ))
        .is_ok());
    }

    #[test]
    fn duration_helpers_saturate_instead_of_panicking() {
        let motion = MotionSettings {
            enabled: true,
            idle_timeout_secs: 1e30,
        };
        assert_eq!(motion.idle_timeout(), Duration::from_secs_f64(MAX_DURATION_SECS));

        let monitoring = MonitoringSettings {
            grace_secs: -1.0,
            ..MonitoringSettings::default()
        };
        assert_eq!(monitoring.grace(), Duration::ZERO);
    }
}
