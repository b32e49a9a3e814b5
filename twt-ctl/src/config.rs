//! Configuration for the TWT control tool.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use twt_core::message::{NegotiationType, WakeDurationUnit};
use twt_core::{ManagerConfig, TransportConfig, TwtParameters};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Session manager settings.
    pub manager: ManagerSection,
    /// Firmware channel settings.
    pub transport: TransportSection,
    /// Values used for request fields not given on the command line.
    pub defaults: RequestDefaults,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    /// Live sessions allowed per interface.
    pub max_sessions_per_interface: usize,
    /// Enable TWT on an interface before its first setup.
    pub enable_on_first_setup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Requests queued towards the firmware.
    pub queue_depth: usize,
    /// How long a command may wait for the firmware's answer.
    pub dispatch_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub negotiation_type: NegotiationType,
    pub wake_duration_unit: WakeDurationUnit,
    /// Nominal minimum wake duration, in `wake_duration_unit`s.
    pub min_wake_duration: u8,
    pub exponent: u8,
    pub mantissa: u16,
    pub trigger: bool,
    pub unannounced: bool,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            max_sessions_per_interface: 8,
            enable_on_first_setup: true,
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            queue_depth: 32,
            dispatch_timeout_ms: 2000,
        }
    }
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            negotiation_type: NegotiationType::Individual,
            wake_duration_unit: WakeDurationUnit::Micros256,
            min_wake_duration: 64,
            exponent: 10,
            mantissa: 512,
            trigger: true,
            unannounced: false,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CtlConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_sessions_per_interface: self.manager.max_sessions_per_interface.clamp(1, 64),
            enable_on_first_setup: self.manager.enable_on_first_setup,
        }
    }

    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            queue_depth: self.transport.queue_depth.clamp(1, 1024),
            dispatch_timeout: Duration::from_millis(self.transport.dispatch_timeout_ms.max(1)),
        }
    }

    /// A setup request for `flow_id` filled in from `[defaults]`.
    pub fn request_template(&self) -> TwtParameters {
        let d = &self.defaults;
        TwtParameters {
            negotiation_type: d.negotiation_type,
            wake_duration_unit: d.wake_duration_unit,
            min_wake_duration: d.min_wake_duration,
            exponent: d.exponent.min(31),
            mantissa: d.mantissa,
            trigger: d.trigger,
            flow_type_unannounced: d.unannounced,
            ..TwtParameters::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
