//! Engine configuration.
//!
//! Every section is optional. A missing file section means defaults; a
//! missing `[ticket_mirror]` means the mirror is off.
//!
//! # Example
//!
//! ```toml
//! [warranty]
//! years = 2
//!
//! [sla]
//! low_hours = 240
//! normal_hours = 120
//! high_hours = 48
//! urgent_hours = 24
//!
//! [ticket_mirror]
//! base_url = "https://tickets.example.com/api"
//! api_token = "tk_..."            # or RMA_TICKET_API_TOKEN
//! timeout_secs = 10
//!
//! [ticket_mirror.stages]
//! received = "New"
//! testing = "In Progress"
//! back_to_customer = "Solved"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use rma_storage::{Priority, Stage};

use crate::warranty::WarrantyPolicy;

/// Longest accepted manufacturer warranty window.
pub const MAX_WARRANTY_YEARS: i32 = 10;

/// Longest accepted SLA window, in hours (ten years).
pub const MAX_SLA_HOURS: i64 = 10 * 366 * 24;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub warranty: WarrantyPolicy,
    #[serde(default)]
    pub sla: SlaPolicy,
    /// `None` disables the ticket mirror.
    #[serde(default)]
    pub ticket_mirror: Option<TicketMirrorConfig>,
}

/// `[sla]` section: hours from creation until a case is due, per priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    #[serde(default = "default_low_hours")]
    pub low_hours: i64,
    #[serde(default = "default_normal_hours")]
    pub normal_hours: i64,
    #[serde(default = "default_high_hours")]
    pub high_hours: i64,
    #[serde(default = "default_urgent_hours")]
    pub urgent_hours: i64,
}

fn default_low_hours() -> i64 {
    240
}
fn default_normal_hours() -> i64 {
    120
}
fn default_high_hours() -> i64 {
    48
}
fn default_urgent_hours() -> i64 {
    24
}

impl Default for SlaPolicy {
    fn default() -> Self {
        SlaPolicy {
            low_hours: default_low_hours(),
            normal_hours: default_normal_hours(),
            high_hours: default_high_hours(),
            urgent_hours: default_urgent_hours(),
        }
    }
}

impl SlaPolicy {
    pub fn hours_for(&self, priority: Priority) -> i64 {
        match priority {
            Priority::Low => self.low_hours,
            Priority::Normal => self.normal_hours,
            Priority::High => self.high_hours,
            Priority::Urgent => self.urgent_hours,
        }
    }

    /// `None` when the window is not representable.
    pub fn due_after(&self, priority: Priority) -> Option<Duration> {
        self.hours_for(priority)
            .checked_mul(3600)
            .map(Duration::seconds)
    }

    /// Deadline for a case of `priority` opened at `from`. `None` when the
    /// result falls outside the supported date range.
    pub fn due_at(&self, priority: Priority, from: OffsetDateTime) -> Option<OffsetDateTime> {
        self.due_after(priority).and_then(|d| from.checked_add(d))
    }
}

/// `[ticket_mirror]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMirrorConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Case stage name → external stage name. Unmapped stages are not synced.
    #[serde(default)]
    pub stages: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for TicketMirrorConfig {
    fn default() -> Self {
        TicketMirrorConfig {
            base_url: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
            stages: BTreeMap::new(),
        }
    }
}

impl TicketMirrorConfig {
    /// The stage mapping keyed by [`Stage`]. Unknown stage names are errors.
    pub fn stage_map(&self) -> Result<BTreeMap<Stage, String>, ConfigError> {
        let mut map = BTreeMap::new();
        let mut problems = Vec::new();
        for (name, external) in &self.stages {
            match name.parse::<Stage>() {
                Ok(stage) => {
                    map.insert(stage, external.trim().to_string());
                }
                Err(e) => problems.push(format!("ticket_mirror.stages: {}", e)),
            }
        }
        if problems.is_empty() {
            Ok(map)
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl EngineConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges. Reports every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if !(1..=MAX_WARRANTY_YEARS).contains(&self.warranty.years) {
            problems.push(format!(
                "warranty.years must be between 1 and {}, got {}",
                MAX_WARRANTY_YEARS, self.warranty.years
            ));
        }

        for (name, hours) in [
            ("low_hours", self.sla.low_hours),
            ("normal_hours", self.sla.normal_hours),
            ("high_hours", self.sla.high_hours),
            ("urgent_hours", self.sla.urgent_hours),
        ] {
            if !(1..=MAX_SLA_HOURS).contains(&hours) {
                problems.push(format!(
                    "sla.{} must be between 1 and {}, got {}",
                    name, MAX_SLA_HOURS, hours
                ));
            }
        }

        if let Some(mirror) = &self.ticket_mirror {
            if let Err(ConfigError::Invalid(mut stage_problems)) = mirror.stage_map() {
                problems.append(&mut stage_problems);
            }
            for (stage, external) in &mirror.stages {
                if external.trim().is_empty() {
                    problems.push(format!("ticket_mirror.stages.{} must not be blank", stage));
                }
            }
            let has_url = mirror
                .base_url
                .as_deref()
                .is_some_and(|u| !u.trim().is_empty());
            if !has_url {
                problems.push("ticket_mirror.base_url is required".to_string());
            }
            if mirror.timeout_secs == 0 {
                problems.push("ticket_mirror.timeout_secs must be positive".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
