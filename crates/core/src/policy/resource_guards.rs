// Resource guards (spec §4.6): process registry + reaper, storage quota,
// loop detection, inter-agent cooldown. Each guard is a small, independently
// testable piece of state the pipeline and background workers consult
// before taking an action that could run away.

use crate::atoms::constants::{LOOP_DETECTION_WINDOW, STORAGE_HARD_STOP_PCT, STORAGE_SOFT_ALERT_PCT};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks spawned child processes so a reaper can kill anything that
/// outlives `max_lifetime`. The LLM cannot bypass registration because every
/// spawn tool is written to register before returning.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: HashMap<u32, ProcessEntry>,
}

#[derive(Debug, Clone)]
struct ProcessEntry {
    purpose: String,
    registered_at: Instant,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pid: u32, purpose: &str) {
        self.entries.insert(pid, ProcessEntry { purpose: purpose.to_string(), registered_at: Instant::now() });
    }

    pub fn unregister(&mut self, pid: u32) {
        self.entries.remove(&pid);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pids whose age exceeds `max_lifetime`. The caller (a reaper task)
    /// kills these and then calls `unregister`.
    pub fn overdue(&self, max_lifetime: Duration) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, e)| e.registered_at.elapsed() > max_lifetime)
            .map(|(pid, _)| *pid)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Ok,
    SoftAlert,
    HardStop,
}

pub fn storage_status(used_bytes: u64, quota_bytes: u64) -> StorageStatus {
    if quota_bytes == 0 {
        return StorageStatus::Ok;
    }
    let ratio = used_bytes as f64 / quota_bytes as f64;
    if ratio >= STORAGE_HARD_STOP_PCT {
        StorageStatus::HardStop
    } else if ratio >= STORAGE_SOFT_ALERT_PCT {
        StorageStatus::SoftAlert
    } else {
        StorageStatus::Ok
    }
}

/// Hashes a fixed-length prefix of each assistant response in a session and
/// flags when the last `LOOP_DETECTION_WINDOW` are all identical.
#[derive(Debug, Default)]
pub struct LoopDetector {
    recent_hashes: Vec<[u8; 32]>,
}

impl LoopDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn hash_prefix(text: &str) -> [u8; 32] {
        const PREFIX_LEN: usize = 200;
        let prefix: String = text.chars().take(PREFIX_LEN).collect();
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.finalize().into()
    }

    /// Record a response and return true if this push completed a
    /// `LOOP_DETECTION_WINDOW`-long run of near-duplicates.
    pub fn record(&mut self, response: &str) -> bool {
        let hash = Self::hash_prefix(response);
        self.recent_hashes.push(hash);
        if self.recent_hashes.len() > LOOP_DETECTION_WINDOW {
            self.recent_hashes.remove(0);
        }
        self.recent_hashes.len() == LOOP_DETECTION_WINDOW
            && self.recent_hashes.windows(2).all(|w| w[0] == w[1])
    }

    pub fn reset(&mut self) {
        self.recent_hashes.clear();
    }
}

/// Per-recipient minimum gap between outbound proactive messages.
#[derive(Debug, Default)]
pub struct InterAgentCooldown {
    last_sent: HashMap<String, Instant>,
}

impl InterAgentCooldown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, recipient: &str, min_gap: Duration) -> bool {
        let now = Instant::now();
        match self.last_sent.get(recipient) {
            Some(last) if now.duration_since(*last) < min_gap => false,
            _ => {
                self.last_sent.insert(recipient.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overdue_processes_are_detected() {
        let mut reg = ProcessRegistry::new();
        reg.register(123, "web_fetch subprocess");
        assert!(reg.overdue(Duration::from_secs(0)).contains(&123));
        assert!(reg.overdue(Duration::from_secs(3600)).is_empty());
        reg.unregister(123);
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn storage_status_thresholds() {
        assert_eq!(storage_status(50, 100), StorageStatus::Ok);
        assert_eq!(storage_status(80, 100), StorageStatus::SoftAlert);
        assert_eq!(storage_status(95, 100), StorageStatus::HardStop);
    }

    #[test]
    fn loop_detector_flags_three_near_duplicates() {
        let mut detector = LoopDetector::new();
        assert!(!detector.record("I'll check that for you."));
        assert!(!detector.record("I'll check that for you."));
        assert!(detector.record("I'll check that for you."));
    }

    #[test]
    fn loop_detector_ignores_varied_responses() {
        let mut detector = LoopDetector::new();
        assert!(!detector.record("first"));
        assert!(!detector.record("second"));
        assert!(!detector.record("third"));
    }

    #[test]
    fn cooldown_blocks_rapid_resends_to_same_recipient() {
        let mut cooldown = InterAgentCooldown::new();
        assert!(cooldown.allow("alice", Duration::from_secs(60)));
        assert!(!cooldown.allow("alice", Duration::from_secs(60)));
        assert!(cooldown.allow("bob", Duration::from_secs(60)));
    }
}
