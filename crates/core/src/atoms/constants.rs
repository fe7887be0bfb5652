// Atoms: tunable defaults. All overridable via Config (spec §6.3).

/// Max conversation turns kept per session before oldest user/assistant pairs
/// are trimmed, keeping system anchors (spec §3).
pub const DEFAULT_MAX_CONVERSATION_LEN: usize = 20;

/// Max plan→execute→reflect rounds in a single turn (spec §4.2).
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Default approval timeout (spec §4.1).
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 3600;

/// Default gateway loopback port (spec §6.1).
pub const DEFAULT_GATEWAY_PORT: u16 = 18789;

/// Goal runner defaults (spec §6.3).
pub const DEFAULT_MAX_CHECKPOINTS: usize = 20;
pub const MIN_CHECKPOINTS: usize = 3;
pub const DEFAULT_MAX_CHECKPOINT_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_LLM_CALLS_PER_GOAL: u32 = 200;
pub const DEFAULT_COST_BUDGET_PER_GOAL_USD: f64 = 5.0;
pub const DEFAULT_CONTEXT_SUMMARY_MAX_TOKENS: usize = 2000;
pub const DEFAULT_PAUSE_BETWEEN_CHECKPOINTS_SECS: u64 = 2;
pub const EVALUATE_PROGRESS_EVERY_N_CHECKPOINTS: u32 = 2;
pub const DEFAULT_MAX_TOTAL_TIME_PER_GOAL_SECS: u64 = 86_400;

/// Autonomous mind defaults (spec §4.3, §6.3).
pub const DEFAULT_MIND_WAKEUP_SECS: u64 = 300;
pub const DEFAULT_MIND_MIN_WAKEUP_SECS: u64 = 60;
pub const DEFAULT_MIND_MAX_WAKEUP_SECS: u64 = 3600;
pub const DEFAULT_MIND_MAX_ROUNDS_PER_WAKEUP: usize = 8;
pub const DEFAULT_MIND_MAX_MESSAGES_PER_HOUR: u32 = 5;
pub const KNOWLEDGE_STALENESS_DAYS: i64 = 30;
pub const PRESENCE_SILENCE_HOURS: i64 = 48;

/// Vault key derivation (spec §4.6 "≥600,000 iterations").
pub const VAULT_PBKDF_MIN_ITERATIONS: u32 = 600_000;
pub const VAULT_SALT_LEN: usize = 16;
pub const VAULT_KEY_LEN: usize = 32;

/// Resource guards (spec §4.6).
pub const DEFAULT_MAX_PROCESS_LIFETIME_SECS: u64 = 3600;
pub const STORAGE_SOFT_ALERT_PCT: f64 = 0.80;
pub const STORAGE_HARD_STOP_PCT: f64 = 0.95;
pub const LOOP_DETECTION_WINDOW: usize = 3;
pub const DEFAULT_INTER_AGENT_COOLDOWN_SECS: u64 = 60;

/// Budget warning/hard-switch thresholds (spec §4.4).
pub const DAILY_BUDGET_WARN_PCT: f64 = 0.80;
pub const DAILY_BUDGET_HARD_PCT: f64 = 1.00;

/// Truncation-detection heuristic thresholds (spec §4.4).
pub const SILENT_TRUNCATION_TOKEN_THRESHOLD: u32 = 500;

/// Data directory layout (spec §6.5).
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const STORE_FILE_NAME: &str = "agent.db";
pub const VAULT_FILE_NAME: &str = "vault.enc";
pub const VAULT_SALT_FILE_NAME: &str = "vault.salt";
pub const SCRATCHPAD_FILE_NAME: &str = "scratchpad.md";
pub const FINGERPRINT_FILE_NAME: &str = ".agent_fingerprint";
