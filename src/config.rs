use emutime_core::TimingConfig;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingModel {
    /// Virtual time follows executed CPU ticks.
    #[default]
    SingleCore,
    /// A background thread dispatches against the host clock.
    Multicore,
}

impl SchedulingModel {
    pub fn is_multicore(self) -> bool {
        matches!(self, Self::Multicore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub model: SchedulingModel,
    /// CPU ticks to execute before a single-core run stops.
    pub cycles: u64,
    /// Ticks credited per simulated instruction batch.
    pub batch_ticks: u64,
    pub max_slice_length: i64,
    /// Host time a multicore run lasts.
    pub duration_ms: u64,
    pub spin_threshold_us: u64,
    pub rebase_after_pause: bool,
    pub vblank_period_us: u64,
    pub audio_period_us: u64,
    /// One-shot deadline that stops the audio timer.
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let timing = TimingConfig::default();
        Self {
            model: SchedulingModel::default(),
            // 100ms of emulated time.
            cycles: 102_000_000,
            batch_ticks: 500,
            max_slice_length: timing.max_slice_length,
            duration_ms: 100,
            spin_threshold_us: timing.spin_threshold.as_micros() as u64,
            rebase_after_pause: timing.rebase_after_pause,
            vblank_period_us: 16_667,
            audio_period_us: 5_000,
            timeout_ms: 50,
        }
    }
}

impl ProbeConfig {
    pub fn timing_config(&self) -> TimingConfig {
        TimingConfig {
            multicore: self.model.is_multicore(),
            max_slice_length: self.max_slice_length.max(1),
            spin_threshold: Duration::from_micros(self.spin_threshold_us),
            rebase_after_pause: self.rebase_after_pause,
            ..TimingConfig::default()
        }
    }

    pub fn vblank_period(&self) -> Duration {
        Duration::from_micros(self.vblank_period_us)
    }

    pub fn audio_period(&self) -> Duration {
        Duration::from_micros(self.audio_period_us)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("emutime").join("probe.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("emutime").join("probe.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("emutime")
            .join("probe.toml");
    }

    PathBuf::from("probe.toml")
}

pub fn load_from_file(path: &Path) -> ProbeConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return ProbeConfig::default(),
    };

    match toml::from_str::<ProbeConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse probe config {}: {e}; using defaults",
                path.display()
            );
            ProbeConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &ProbeConfig) -> Result<(), ProbeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg)?;
    std::fs::write(path, text)?;
    Ok(())
}
