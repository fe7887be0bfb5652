// Configuration surface (spec §6.3). Loaded externally to the core (from a
// TOML file by the CLI's `init`/startup path); this module only defines the
// typed shape and validation. Unknown enum values fail to deserialize, which
// `toml::from_str` already turns into a fatal parse error at the call site.

use crate::atoms::constants::*;
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{AuthorityTier, PermissionMode, ProviderKind, TaskType, ToolOverride};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// (channel, platform-immutable user id) -> tier. Channel "*" matches any.
    #[serde(default)]
    pub owner: Vec<(String, String)>,
    #[serde(default)]
    pub trusted: Vec<(String, String)>,
    #[serde(default)]
    pub public: Vec<(String, String)>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self { owner: vec![("cli".into(), "*".into())], trusted: vec![], public: vec![] }
    }
}

impl AuthorityConfig {
    /// Resolve the tier for a (channel, user_id) pair. CLI is owner by
    /// default (spec §4.1); unknown network users default to public.
    pub fn resolve(&self, channel: &str, user_id: &str) -> AuthorityTier {
        let matches = |list: &[(String, String)]| {
            list.iter().any(|(c, u)| (c == channel || c == "*") && (u == user_id || u == "*"))
        };
        if matches(&self.owner) {
            AuthorityTier::Owner
        } else if matches(&self.trusted) {
            AuthorityTier::Trusted
        } else if channel == "cli" {
            AuthorityTier::Owner
        } else {
            AuthorityTier::Public
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    pub mode: PermissionMode,
    #[serde(default)]
    pub tool_overrides: HashMap<String, ToolOverride>,
    #[serde(default)]
    pub shell_auto_approve: Vec<String>,
    #[serde(default)]
    pub shell_always_block: Vec<String>,
    #[serde(default)]
    pub file_write_allow_prefixes: Vec<String>,
    #[serde(default)]
    pub file_write_always_ask_prefixes: Vec<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            mode: PermissionMode::SmartAuto,
            tool_overrides: HashMap::new(),
            shell_auto_approve: vec!["^ls ".into(), "^pwd$".into(), "^cat ".into()],
            shell_always_block: vec![
                r"rm\s+-rf\s+/".into(),
                r":\(\)\s*\{.*:\|:&\s*\};:".into(),
                r"mkfs\.".into(),
                r"dd\s+if=.*of=/dev/".into(),
            ],
            file_write_allow_prefixes: vec![],
            file_write_always_ask_prefixes: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub kind: ProviderKind,
    pub enabled: bool,
    /// Vault key name holding the API key, never the key itself.
    pub api_key_ref: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// task_type name (e.g. "planning") -> model id. Stored as a string map
    /// because TOML table keys must be strings; use `model_for` to look up
    /// by the typed `TaskType`.
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default)]
    pub daily_budget_usd: Option<f64>,
}

impl ProviderEntry {
    pub fn model_for(&self, task_type: TaskType) -> Option<&str> {
        self.models.get(task_type_key(task_type)).map(String::as_str)
    }
}

/// Stable string key for a task type, used as a config map key.
pub fn task_type_key(t: TaskType) -> &'static str {
    match t {
        TaskType::Planning => "planning",
        TaskType::Coding => "coding",
        TaskType::Review => "review",
        TaskType::Analysis => "analysis",
        TaskType::Simple => "simple",
        TaskType::Embedding => "embedding",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ordered provider priority, highest first.
    pub providers: Vec<ProviderEntry>,
    #[serde(default = "default_daily_budget")]
    pub daily_budget_usd: f64,
}

fn default_daily_budget() -> f64 {
    20.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { providers: vec![], daily_budget_usd: default_daily_budget() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalLoopConfig {
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
    #[serde(default = "default_max_checkpoint_attempts")]
    pub max_checkpoint_attempts: u32,
    #[serde(default = "default_max_llm_calls_per_goal")]
    pub max_llm_calls_per_goal: u32,
    #[serde(default = "default_max_time_per_checkpoint_secs")]
    pub max_time_per_checkpoint_seconds: u64,
    #[serde(default = "default_max_total_time_per_goal_secs")]
    pub max_total_time_per_goal_seconds: u64,
    #[serde(default = "default_cost_budget_per_goal")]
    pub cost_budget_per_goal_usd: f64,
    #[serde(default = "default_context_summary_max_tokens")]
    pub context_summary_max_tokens: usize,
    #[serde(default)]
    pub auto_continue: bool,
    #[serde(default = "default_pause_between_checkpoints")]
    pub pause_between_checkpoints_seconds: u64,
}

fn default_max_checkpoints() -> usize { DEFAULT_MAX_CHECKPOINTS }
fn default_max_checkpoint_attempts() -> u32 { DEFAULT_MAX_CHECKPOINT_ATTEMPTS }
fn default_max_llm_calls_per_goal() -> u32 { DEFAULT_MAX_LLM_CALLS_PER_GOAL }
fn default_max_time_per_checkpoint_secs() -> u64 { 1800 }
fn default_max_total_time_per_goal_secs() -> u64 { DEFAULT_MAX_TOTAL_TIME_PER_GOAL_SECS }
fn default_cost_budget_per_goal() -> f64 { DEFAULT_COST_BUDGET_PER_GOAL_USD }
fn default_context_summary_max_tokens() -> usize { DEFAULT_CONTEXT_SUMMARY_MAX_TOKENS }
fn default_pause_between_checkpoints() -> u64 { DEFAULT_PAUSE_BETWEEN_CHECKPOINTS_SECS }

impl Default for GoalLoopConfig {
    fn default() -> Self {
        Self {
            max_checkpoints: default_max_checkpoints(),
            max_checkpoint_attempts: default_max_checkpoint_attempts(),
            max_llm_calls_per_goal: default_max_llm_calls_per_goal(),
            max_time_per_checkpoint_seconds: default_max_time_per_checkpoint_secs(),
            max_total_time_per_goal_seconds: default_max_total_time_per_goal_secs(),
            cost_budget_per_goal_usd: default_cost_budget_per_goal(),
            context_summary_max_tokens: default_context_summary_max_tokens(),
            auto_continue: false,
            pause_between_checkpoints_seconds: default_pause_between_checkpoints(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_wakeup")]
    pub wakeup_seconds: u64,
    #[serde(default = "default_min_wakeup")]
    pub min_wakeup_seconds: u64,
    #[serde(default = "default_max_wakeup")]
    pub max_wakeup_seconds: u64,
    #[serde(default = "default_budget_pct")]
    pub budget_pct: f64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds_per_wakeup: usize,
    #[serde(default = "default_max_messages_per_hour")]
    pub max_messages_per_hour: u32,
    /// Deterministic ranking order for the priority stack (spec §4.3 step 4).
    #[serde(default = "default_priority_order")]
    pub priority_order: Vec<String>,
}

fn default_wakeup() -> u64 { DEFAULT_MIND_WAKEUP_SECS }
fn default_min_wakeup() -> u64 { DEFAULT_MIND_MIN_WAKEUP_SECS }
fn default_max_wakeup() -> u64 { DEFAULT_MIND_MAX_WAKEUP_SECS }
fn default_budget_pct() -> f64 { 0.2 }
fn default_max_rounds() -> usize { DEFAULT_MIND_MAX_ROUNDS_PER_WAKEUP }
fn default_max_messages_per_hour() -> u32 { DEFAULT_MIND_MAX_MESSAGES_PER_HOUR }
fn default_priority_order() -> Vec<String> {
    vec![
        "active_goals".into(),
        "revenue".into(),
        "scheduled".into(),
        "capability_gaps".into(),
        "presence".into(),
        "knowledge_staleness".into(),
    ]
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wakeup_seconds: default_wakeup(),
            min_wakeup_seconds: default_min_wakeup(),
            max_wakeup_seconds: default_max_wakeup(),
            budget_pct: default_budget_pct(),
            max_rounds_per_wakeup: default_max_rounds(),
            max_messages_per_hour: default_max_messages_per_hour(),
            priority_order: default_priority_order(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_cache_lru_cap")]
    pub cache_lru_cap: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

fn default_data_dir() -> String { DEFAULT_DATA_DIR.to_string() }
fn default_cache_lru_cap() -> usize { 500 }
fn default_max_file_size() -> u64 { 50 * 1024 * 1024 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_lru_cap: default_cache_lru_cap(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub permission: PermissionConfig,
    /// Protected-file path prefixes: immutable at runtime, re-asserted even
    /// if this field were edited (spec §6.3).
    #[serde(default)]
    pub protected_paths: Vec<String>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub goal_loop: GoalLoopConfig,
    #[serde(default)]
    pub mind: MindConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_max_rounds_per_turn")]
    pub max_rounds: usize,
    #[serde(default = "default_max_conversation_len")]
    pub max_conversation_len: usize,
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_seconds: u64,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
}

fn default_max_rounds_per_turn() -> usize { DEFAULT_MAX_ROUNDS }
fn default_max_conversation_len() -> usize { DEFAULT_MAX_CONVERSATION_LEN }
fn default_approval_timeout() -> u64 { DEFAULT_APPROVAL_TIMEOUT_SECS }
fn default_gateway_port() -> u16 { DEFAULT_GATEWAY_PORT }

impl Config {
    /// Parse a TOML config. Expands `~` in path-like fields.
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        let mut cfg: Config = toml::from_str(s)?;
        cfg.protected_paths = cfg.protected_paths.into_iter().map(expand_tilde).collect();
        cfg.permission.file_write_allow_prefixes = cfg
            .permission
            .file_write_allow_prefixes
            .into_iter()
            .map(expand_tilde)
            .collect();
        cfg.permission.file_write_always_ask_prefixes = cfg
            .permission
            .file_write_always_ask_prefixes
            .into_iter()
            .map(expand_tilde)
            .collect();
        // The policy kernel re-asserts protected roots even if config tried
        // to drop them (spec §6.3 "immutable at runtime").
        for must in crate::policy::protected_files::MANDATORY_PROTECTED_PATHS {
            let expanded = expand_tilde((*must).to_string());
            if !cfg.protected_paths.contains(&expanded) {
                cfg.protected_paths.push(expanded);
            }
        }
        Ok(cfg)
    }

    pub fn load_from_path(path: &std::path::Path) -> CoreResult<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&s)
    }
}

fn expand_tilde(path: String) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_defaults_owner() {
        let cfg = AuthorityConfig::default();
        assert_eq!(cfg.resolve("cli", "anyone"), AuthorityTier::Owner);
    }

    #[test]
    fn unknown_network_user_defaults_public() {
        let cfg = AuthorityConfig::default();
        assert_eq!(cfg.resolve("webchat", "stranger"), AuthorityTier::Public);
    }

    #[test]
    fn protected_paths_always_include_mandatory_roots() {
        let cfg = Config::from_toml_str("").unwrap();
        for must in crate::policy::protected_files::MANDATORY_PROTECTED_PATHS {
            let expanded = expand_tilde((*must).to_string());
            assert!(cfg.protected_paths.contains(&expanded));
        }
    }

    #[test]
    fn tilde_expansion_in_protected_paths() {
        let toml = "protected_paths = [\"~/.ssh\"]\n";
        let cfg = Config::from_toml_str(toml).unwrap();
        let home = dirs::home_dir().unwrap();
        assert!(cfg.protected_paths.contains(&home.join(".ssh").to_string_lossy().to_string()));
    }

    #[test]
    fn unknown_enum_value_is_fatal_parse_error() {
        let toml = "[permission]\nmode = \"not_a_real_mode\"\n";
        assert!(Config::from_toml_str(toml).is_err());
    }
}
