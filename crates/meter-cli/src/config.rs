use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use meter_store::{SyncMode, WalConfig};
use meter_types::{CalendarDate, PeriodSelector};
use serde::{Deserialize, Serialize};

const CONFIG_ENV: &str = "METER_CONFIG";
const DEFAULT_FILE: &str = "meter.toml";

/// Settings of the `meter` binary, stored as TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Directory holding the ledger log.
    pub data_dir: PathBuf,
    /// Display unit of readings and consumption.
    pub unit: String,
    pub wal: WalSection,
    pub preferences: Preferences,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalSection {
    /// `fsync` after every append.
    pub sync_every_write: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub view_mode: ViewMode,
    pub report_recipients: Vec<String>,
}

/// Default period of `list` and `watch`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Monthly,
    Yearly,
    #[value(name = "all_time")]
    AllTime,
}

impl ViewMode {
    pub fn selector(self, today: CalendarDate) -> PeriodSelector {
        match self {
            Self::Monthly => PeriodSelector::Month(today.month_key()),
            Self::Yearly => PeriodSelector::Year(today.year()),
            Self::AllTime => PeriodSelector::All,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".meter"),
            unit: "kWh".into(),
            wal: WalSection::default(),
            preferences: Preferences::default(),
        }
    }
}

impl Default for WalSection {
    fn default() -> Self {
        Self {
            sync_every_write: true,
        }
    }
}

impl MeterConfig {
    /// Config file to use: `explicit`, else `$METER_CONFIG`, else `./meter.toml`.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        locate_with(explicit, std::env::var_os(CONFIG_ENV))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let text = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }

    pub fn wal_config(&self) -> WalConfig {
        WalConfig {
            sync_mode: if self.wal.sync_every_write {
                SyncMode::EveryWrite
            } else {
                SyncMode::OsDefault
            },
        }
    }

    /// Add a report recipient. Returns `false` if it was already listed.
    pub fn add_recipient(&mut self, email: &str) -> anyhow::Result<bool> {
        let email = email.trim();
        if !is_valid_email(email) {
            bail!("invalid e-mail address: '{email}'");
        }
        let recipients = &mut self.preferences.report_recipients;
        if recipients.iter().any(|r| r.eq_ignore_ascii_case(email)) {
            return Ok(false);
        }
        recipients.push(email.to_string());
        Ok(true)
    }

    /// Remove a report recipient. Returns `false` if it was not listed.
    pub fn remove_recipient(&mut self, email: &str) -> bool {
        let email = email.trim();
        let recipients = &mut self.preferences.report_recipients;
        let before = recipients.len();
        recipients.retain(|r| !r.eq_ignore_ascii_case(email));
        recipients.len() != before
    }
}

fn locate_with(explicit: Option<&Path>, env: Option<OsString>) -> PathBuf {
    match (explicit, env) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(env)) if !env.is_empty() => PathBuf::from(env),
        _ => PathBuf::from(DEFAULT_FILE),
    }
}

/// `local@domain.tld` with the character classes mail clients accept.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let local_ok = (1..=256).contains(&local.len())
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+._%-".contains(c));

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 65
                && label.starts_with(|c: char| c.is_ascii_alphanumeric())
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    local_ok && domain_ok
}
