//! Environment-driven settings, optionally namespaced by a profile.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pull `.env` into the process environment when present.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Variable lookup for one profile. With profile `DEV`, `RULES_DIR` is read
/// from `DEV_RULES_DIR` before plain `RULES_DIR`. Empty values count as unset.
struct ProfileEnv<'a> {
    profile: &'a str,
}

impl ProfileEnv<'_> {
    fn get(&self, key: &str) -> Option<String> {
        let lookup = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());
        if self.profile.is_empty() {
            return lookup(key);
        }
        lookup(&format!("{}_{key}", self.profile)).or_else(|| lookup(key))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
            None => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upper-cased; empty means no profile.
    pub profile: String,
    pub rules: RulesConfig,
    pub editor: EditorConfig,
}

impl Config {
    /// Settings for the profile named by `OSS_PROFILE`. Call
    /// [`load_dotenv`] beforehand to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::for_profile(&env::var("OSS_PROFILE").unwrap_or_default())
    }

    pub fn for_profile(profile: &str) -> Self {
        let profile = profile.to_uppercase();
        let vars = ProfileEnv { profile: &profile };
        Self {
            rules: RulesConfig::from_vars(&vars),
            editor: EditorConfig::from_vars(&vars),
            profile,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn log_summary(&self) {
        tracing::info!("Configuration (profile: {}):", self.profile_label());
        tracing::info!(
            "  rules:   dir={}, extension={}, watch={}",
            self.rules.rules_dir.display(),
            self.rules.extension,
            self.rules.watch
        );
        tracing::info!(
            "  editor:  enabled={}, default_zone={}",
            self.editor.enabled,
            self.editor.default_zone
        );
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "rules": {
                "dir": self.rules.rules_dir,
                "extension": self.rules.extension,
                "watch": self.rules.watch,
            },
            "editor": {
                "enabled": self.editor.enabled,
                "default_zone": self.editor.default_zone,
            },
        })
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub rules_dir: PathBuf,
    /// File extension of rule files, without the dot.
    pub extension: String,
    pub watch: bool,
}

impl RulesConfig {
    fn from_vars(vars: &ProfileEnv<'_>) -> Self {
        let extension = vars.string("RULES_EXTENSION", "oss");
        Self {
            rules_dir: vars.string("RULES_DIR", "rules").into(),
            extension: extension.trim_start_matches('.').to_string(),
            watch: vars.flag("RULES_WATCH", false),
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules_dir: PathBuf::from("rules"),
            extension: "oss".to_string(),
            watch: false,
        }
    }
}

// ── Editor ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Whether a freshly created edit manager starts with editing turned on.
    pub enabled: bool,
    /// Zone an item lands in when it has no `after` and no `zones` are declared.
    pub default_zone: String,
}

impl EditorConfig {
    fn from_vars(vars: &ProfileEnv<'_>) -> Self {
        Self {
            enabled: vars.flag("EDITOR_ENABLED", false),
            default_zone: vars.string("EDITOR_DEFAULT_ZONE", crate::keys::DEFAULT_ZONE),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_zone: crate::keys::DEFAULT_ZONE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_keys_win_over_plain_keys() {
        env::set_var("OSSCFGA_RULES_DIR", "/tmp/profiled-rules");
        env::set_var("OSSCFGA_EDITOR_ENABLED", "yes");
        let config = Config::for_profile("osscfga");
        assert_eq!(config.profile, "OSSCFGA");
        assert_eq!(config.rules.rules_dir, PathBuf::from("/tmp/profiled-rules"));
        assert!(config.editor.enabled);
    }

    #[test]
    fn from_env_uses_oss_profile() {
        load_dotenv();
        env::set_var("OSSCFGC_EDITOR_DEFAULT_ZONE", "zTop");
        env::set_var("OSSCFGC_RULES_WATCH", "on");
        env::set_var("OSS_PROFILE", "osscfgc");
        let config = Config::from_env();
        assert_eq!(config.profile, "OSSCFGC");
        assert_eq!(config.profile_label(), "OSSCFGC");
        assert_eq!(config.editor.default_zone, "zTop");
        assert!(config.rules.watch);
        config.log_summary();
    }

    #[test]
    fn extension_is_normalized_without_dot() {
        env::set_var("OSSCFGB_RULES_EXTENSION", ".rules");
        let config = Config::for_profile("OSSCFGB");
        assert_eq!(config.rules.extension, "rules");
    }

    #[test]
    fn summary_uses_default_label() {
        let config = Config {
            profile: String::new(),
            rules: RulesConfig::default(),
            editor: EditorConfig::default(),
        };
        let summary = config.summary();
        assert_eq!(summary["profile"], "default");
        assert_eq!(summary["editor"]["default_zone"], "zMain");
    }
}
