//! INI-backed scan state store.
//!
//! ```ini
//! [scan]
//! last_run_at = 2024-03-06T10:00:00-05:00
//! last_alert_at = 2024-03-06T10:00:00-05:00
//!
//! [channels]
//! cross = 2024-03-06T10:00:00-05:00
//! ```

use crate::domain::error::ScanError;
use crate::domain::scan_state::ScanState;
use crate::ports::state_port::StatePort;
use chrono::{DateTime, FixedOffset};
use configparser::ini::Ini;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const SECTION: &str = "scan";
const CHANNELS: &str = "channels";

pub struct IniStateStore {
    path: PathBuf,
}

impl IniStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn timestamp(
        &self,
        ini: &Ini,
        key: &str,
    ) -> Result<Option<DateTime<FixedOffset>>, ScanError> {
        match ini.get(SECTION, key).filter(|v| !v.trim().is_empty()) {
            None => Ok(None),
            Some(raw) => self.parse(key, &raw).map(Some),
        }
    }

    fn parse(&self, key: &str, raw: &str) -> Result<DateTime<FixedOffset>, ScanError> {
        DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| ScanError::State {
            reason: format!("{}: bad {} '{}': {}", self.path.display(), key, raw, e),
        })
    }

    fn channel_alerts(
        &self,
        ini: &Ini,
    ) -> Result<BTreeMap<String, DateTime<FixedOffset>>, ScanError> {
        let mut alerts = BTreeMap::new();
        let Some(section) = ini.get_map_ref().get(CHANNELS) else {
            return Ok(alerts);
        };
        for (channel, value) in section {
            if let Some(raw) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                alerts.insert(channel.clone(), self.parse(channel, raw)?);
            }
        }
        Ok(alerts)
    }
}

impl StatePort for IniStateStore {
    fn load(&self) -> Result<ScanState, ScanError> {
        if !self.path.exists() {
            return Ok(ScanState::default());
        }
        let mut ini = Ini::new();
        ini.load(&self.path).map_err(|reason| ScanError::State {
            reason: format!("{}: {}", self.path.display(), reason),
        })?;
        Ok(ScanState {
            last_run_at: self.timestamp(&ini, "last_run_at")?,
            last_alert_at: self.timestamp(&ini, "last_alert_at")?,
            channel_alerts: self.channel_alerts(&ini)?,
        })
    }

    fn save(&self, state: &ScanState) -> Result<(), ScanError> {
        let fail = |e: std::io::Error| ScanError::State {
            reason: format!("{}: {}", self.path.display(), e),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        let mut ini = Ini::new();
        for (key, value) in [
            ("last_run_at", state.last_run_at),
            ("last_alert_at", state.last_alert_at),
        ] {
            if let Some(at) = value {
                ini.set(SECTION, key, Some(at.to_rfc3339()));
            }
        }
        for (channel, at) in &state.channel_alerts {
            ini.set(CHANNELS, channel, Some(at.to_rfc3339()));
        }
        ini.write(&self.path).map_err(fail)
    }
}
