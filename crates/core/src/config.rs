use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Environment variable naming the active profile.
pub const PROFILE_KEY: &str = "TENET_PROFILE";

pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_FILTER: &str = "info";

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Profiled lookup: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
struct Profiled<'a, F> {
    profile: &'a str,
    lookup: F,
}

impl<F> Profiled<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            if let Some(v) = (self.lookup)(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        (self.lookup)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.opt(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn usize(&self, key: &str, default: usize) -> usize {
        self.opt(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Runtime settings, built once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Evaluation workers per policy set. 0 means processors + 1.
    pub workers: usize,
    pub init_timeout_secs: u64,
    pub query_timeout_secs: u64,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            workers: 0,
            init_timeout_secs: DEFAULT_INIT_TIMEOUT_SECS,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TENET_PROFILE`. When set (e.g. `CI`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt(PROFILE_KEY).unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        Self::from_lookup(profile, env_opt)
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(profile: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let p = profile.to_uppercase();
        let env = Profiled {
            profile: p.as_str(),
            lookup,
        };
        Self {
            profile: p.clone(),
            workers: env.usize("TENET_WORKERS", 0),
            init_timeout_secs: env.u64("TENET_INIT_TIMEOUT_SECS", DEFAULT_INIT_TIMEOUT_SECS),
            query_timeout_secs: env.u64("TENET_QUERY_TIMEOUT_SECS", DEFAULT_QUERY_TIMEOUT_SECS),
            log_filter: env.or("TENET_LOG", DEFAULT_LOG_FILTER),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Resolve worker count (0 means available parallelism + 1).
    pub fn resolved_workers(&self) -> usize {
        resolve_workers(self.workers)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  workers:        {}", self.resolved_workers());
        tracing::info!("  init timeout:   {}s", self.init_timeout_secs);
        tracing::info!("  query timeout:  {}s", self.query_timeout_secs);
    }
}

/// Resolve a configured worker count, treating 0 as "processors + 1".
pub fn resolve_workers(configured: usize) -> usize {
    if configured == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            + 1
    } else {
        configured
    }
}
