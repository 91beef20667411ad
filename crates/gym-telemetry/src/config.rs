//! Telemetry settings.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `GYM_SERVICE_NAME` | `gym-backend` |
//! | `GYM_LOG_LEVEL`, then `RUST_LOG` | `info` |
//! | `GYM_JSON_LOGS` (`true`/`1`) | off |

/// What to log and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Recorded on the startup line
    pub service_name: String,
    /// Level or full `EnvFilter` directive
    pub log_level: String,
    /// One JSON object per line instead of human-readable output
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `from_env` for one component, named `gym-<component>`.
    pub fn for_component(component: &str) -> Self {
        Self {
            service_name: format!("gym-{component}"),
            ..Self::from_env()
        }
    }

    /// Build from any key lookup; unset keys take the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service_name: lookup("GYM_SERVICE_NAME").unwrap_or_else(|| "gym-backend".into()),
            log_level: lookup("GYM_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "info".into()),
            json_logs: lookup("GYM_JSON_LOGS")
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        }
    }
}
