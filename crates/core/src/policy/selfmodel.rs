// Runtime self-model (spec §4.6). Rebuilt from live state on every turn and
// inserted into the system prompt as a machine-generated block the LLM is
// instructed not to override. The fingerprint binds a running process to
// the config and vault it started with; a mismatch on startup means the
// data directory was copied or tampered with and the process refuses to
// continue rather than run against state it doesn't recognize.

use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{AuthorityTier, Channel, TurnContext};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCountsByPermission {
    pub safe: usize,
    pub moderate: usize,
    pub destructive: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAndStorageUsage {
    pub registered_processes: usize,
    pub data_dir_bytes: u64,
    pub daily_budget_remaining_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub fallback_rate: f64,
    pub suspected_truncation_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSelfModel {
    pub fingerprint: String,
    pub tool_counts: ToolCountsByPermission,
    pub session_authority_tier: AuthorityTier,
    pub session_channel: Channel,
    pub usage: ProcessAndStorageUsage,
    pub provider_health: Vec<ProviderHealth>,
    pub turn_context: TurnContext,
    pub active_goal_id: Option<String>,
    pub active_goal_progress: Option<(i64, i64)>,
}

/// Compute the fingerprint binding config + vault salt + first-boot time.
pub fn compute_fingerprint(config_bytes: &[u8], vault_salt: &[u8], first_boot_timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config_bytes);
    hasher.update(vault_salt);
    hasher.update(first_boot_timestamp.to_le_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compare a freshly computed fingerprint against the one stored in the
/// vault at first boot. Any mismatch is a hard failure — the caller should
/// refuse to start rather than continue with a partially trusted state.
pub fn verify_fingerprint(stored: &str, computed: &str) -> CoreResult<()> {
    if stored == computed {
        Ok(())
    } else {
        Err(CoreError::FingerprintMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = compute_fingerprint(b"config-v1", b"salt123", 1_700_000_000);
        let b = compute_fingerprint(b"config-v1", b"salt123", 1_700_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_any_input() {
        let base = compute_fingerprint(b"config-v1", b"salt123", 1_700_000_000);
        let diff_config = compute_fingerprint(b"config-v2", b"salt123", 1_700_000_000);
        let diff_salt = compute_fingerprint(b"config-v1", b"salt456", 1_700_000_000);
        let diff_time = compute_fingerprint(b"config-v1", b"salt123", 1_700_000_001);
        assert_ne!(base, diff_config);
        assert_ne!(base, diff_salt);
        assert_ne!(base, diff_time);
    }

    #[test]
    fn mismatch_is_a_hard_failure() {
        let stored = compute_fingerprint(b"config-v1", b"salt123", 1_700_000_000);
        let computed = compute_fingerprint(b"config-v2", b"salt123", 1_700_000_000);
        assert!(verify_fingerprint(&stored, &computed).is_err());
        assert!(verify_fingerprint(&stored, &stored).is_ok());
    }
}
