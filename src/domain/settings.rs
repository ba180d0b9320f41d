use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_true(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// A paired sensor and the serial port its SPP link is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub name: String,
    pub port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_device_name")]
    pub default_device_name: String,

    // Transport
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // Discovery
    #[serde(default = "default_true")]
    pub bluetooth_enabled: bool,
    #[serde(default)]
    pub paired_devices: Vec<PairedDevice>,

    // Debug Settings
    #[serde(default = "default_false")]
    pub debug_raw_frame_logging: bool,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_device_name: default_device_name(),
            baud_rate: default_baud_rate(),
            poll_interval_ms: default_poll_interval_ms(),
            bluetooth_enabled: default_true(),
            paired_devices: Vec::new(),
            debug_raw_frame_logging: default_false(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "plantar_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_device_name() -> String {
    "ESP32test".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_poll_interval_ms() -> u64 {
    100
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load_from(settings_path))
    }

    /// Load settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let settings_path = path.into();
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("PlantarLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Remember the port a sensor is bound to. An existing entry with the
    /// same name is replaced.
    pub fn add_paired_device(&mut self, device: PairedDevice) -> anyhow::Result<()> {
        let devices = &mut self.settings.paired_devices;
        match devices.iter_mut().find(|d| d.name == device.name) {
            Some(existing) if *existing == device => return Ok(()),
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.default_device_name, "ESP32test");
        assert_eq!(settings.baud_rate, 115_200);
        assert!(settings.bluetooth_enabled);
        assert!(settings.paired_devices.is_empty());
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = SettingsService::load_from(dir.path().join("settings.json"));
        assert_eq!(service.get().poll_interval_ms, 100);
    }

    #[test]
    fn test_paired_device_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut service = SettingsService::load_from(&path);
        service
            .add_paired_device(PairedDevice {
                name: "RNBT-85CD".into(),
                port: "/dev/rfcomm0".into(),
            })
            .unwrap();
        service
            .add_paired_device(PairedDevice {
                name: "RNBT-85CD".into(),
                port: "/dev/rfcomm1".into(),
            })
            .unwrap();

        let reloaded = SettingsService::load_from(&path);
        assert_eq!(
            reloaded.get().paired_devices,
            vec![PairedDevice {
                name: "RNBT-85CD".into(),
                port: "/dev/rfcomm1".into(),
            }]
        );
    }
}
