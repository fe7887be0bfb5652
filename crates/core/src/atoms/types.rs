// Atoms: shared domain types.
// Every enumeration here is a CLOSED set (spec §9 "Dynamic configuration-by-name");
// an unrecognized value anywhere it is deserialized from config is a fatal parse error.

use serde::{Deserialize, Serialize};

// ── Authority & permission ──────────────────────────────────────────────────

/// Code-enforced classification of a session's user. Determines which tools
/// are even visible and invocable (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityTier {
    Public,
    Trusted,
    Owner,
}

/// Per-tool classification feeding the approval decision (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Safe,
    Moderate,
    Destructive,
    Critical,
}

/// The global approval strategy (spec §4.2, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    AskAlways,
    SmartAuto,
    FullAuto,
}

/// Per-tool override of the mode-driven decision (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOverride {
    Auto,
    Ask,
    Default,
}

// ── Channels ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Cli,
    WebChat,
    Custom(String),
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Cli => write!(f, "cli"),
            Channel::WebChat => write!(f, "webchat"),
            Channel::Custom(s) => write!(f, "{}", s),
        }
    }
}

// ── Sessions & conversation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub local_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ── Tasks, goals, checkpoints ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Planning,
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

// ── LLM routing ──────────────────────────────────────────────────────────────

/// Closed set of task types the router understands (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Planning,
    Coding,
    Review,
    Analysis,
    Simple,
    Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
    LocalOnly,
}

impl ProviderKind {
    /// Rough architecture family, used for cross-architecture review selection
    /// (spec §4.4 "For review, additionally prefer a provider whose architecture
    /// differs from the writer").
    pub fn architecture_family(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude",
            ProviderKind::OpenAi => "gpt",
            ProviderKind::Google => "gemini",
            ProviderKind::LocalOnly => "local",
        }
    }
}

// ── Gateway wire protocol ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Hello,
    Chat,
    Response,
    ApprovalRequest,
    ApprovalResponse,
    Event,
    Command,
    Status,
    Error,
}

/// Closed set of broadcastable event kinds (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskStarted,
    TaskComplete,
    TaskError,
    Notification,
    GoalStarted,
    GoalCheckpointComplete,
    GoalCompleted,
    GoalFailed,
    GoalPaused,
    GoalResumed,
    MindWakeup,
    MindAction,
    MindSleep,
    MindPaused,
    MindResumed,
    MindRevenue,
    MindError,
    AgentSecurityAlert,
}

/// Which context a running agent-loop turn is operating under; surfaced in
/// the runtime self-model (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnContext {
    UserChat,
    GoalExecution,
    MindWakeup,
}

/// Truncate a string at a UTF-8-safe boundary no later than `max_bytes`.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_tier_orders_public_below_owner() {
        assert!(AuthorityTier::Public < AuthorityTier::Trusted);
        assert!(AuthorityTier::Trusted < AuthorityTier::Owner);
    }

    #[test]
    fn truncate_utf8_respects_char_boundaries() {
        let s = "h\u{00e9}llo"; // é is 2 bytes
        let t = truncate_utf8(s, 2);
        assert!(t.len() <= 2);
        assert!(std::str::from_utf8(t.as_bytes()).is_ok());
    }
}
