// Permission decision order (spec §4.2). Five rules, evaluated in order;
// the first one that fires wins. Destructive blacklist and protected-file
// checks are fatal regardless of mode or approval state; everything else
// is mode-dependent.

use crate::atoms::types::{PermissionLevel, PermissionMode, ToolOverride};
use crate::config::PermissionConfig;
use regex::Regex;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    RequireApproval,
    RejectFatal(String),
}

pub struct PermissionCheckInput<'a> {
    pub tool_name: &'a str,
    pub permission_level: PermissionLevel,
    pub target_path: Option<&'a Path>,
    pub shell_command: Option<&'a str>,
    pub protected_prefixes: &'a [String],
}

pub fn decide(cfg: &PermissionConfig, input: &PermissionCheckInput) -> PermissionDecision {
    // Rule 1: protected-file write.
    if let Some(path) = input.target_path {
        if crate::policy::protected_files::is_protected(path, input.protected_prefixes) {
            return PermissionDecision::RejectFatal(format!(
                "refusing to write protected path: {}",
                path.display()
            ));
        }
    }

    // Rule 2: destructive blacklist on the shell command string.
    if let Some(cmd) = input.shell_command {
        if let Some(pattern) = matches_any(&cfg.shell_always_block, cmd) {
            return PermissionDecision::RejectFatal(format!("command matches blocked pattern: {pattern}"));
        }
    }

    // Rule 3: critical permission level or an explicit per-tool "ask" override.
    if input.permission_level == PermissionLevel::Critical {
        return PermissionDecision::RequireApproval;
    }
    if let Some(ToolOverride::Ask) = cfg.tool_overrides.get(input.tool_name) {
        return PermissionDecision::RequireApproval;
    }
    if let Some(ToolOverride::Auto) = cfg.tool_overrides.get(input.tool_name) {
        return PermissionDecision::Allow;
    }

    // Rule 4: mode-specific.
    match cfg.mode {
        PermissionMode::AskAlways => {
            if input.permission_level == PermissionLevel::Safe {
                PermissionDecision::Allow
            } else {
                PermissionDecision::RequireApproval
            }
        }
        PermissionMode::SmartAuto => match input.permission_level {
            PermissionLevel::Safe => PermissionDecision::Allow,
            PermissionLevel::Moderate => {
                if let Some(cmd) = input.shell_command {
                    if matches_any(&cfg.shell_auto_approve, cmd).is_some() {
                        return PermissionDecision::Allow;
                    }
                }
                if let Some(path) = input.target_path {
                    if path_has_allow_prefix(path, &cfg.file_write_allow_prefixes) {
                        return PermissionDecision::Allow;
                    }
                    if path_has_allow_prefix(path, &cfg.file_write_always_ask_prefixes) {
                        return PermissionDecision::RequireApproval;
                    }
                }
                PermissionDecision::RequireApproval
            }
            PermissionLevel::Destructive | PermissionLevel::Critical => PermissionDecision::RequireApproval,
        },
        PermissionMode::FullAuto => PermissionDecision::Allow,
    }
}

fn matches_any(patterns: &[String], text: &str) -> Option<String> {
    patterns.iter().find_map(|p| {
        Regex::new(p).ok().filter(|re| re.is_match(text)).map(|_| p.clone())
    })
}

fn path_has_allow_prefix(path: &Path, prefixes: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    prefixes.iter().any(|p| path_str.starts_with(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_cfg(mode: PermissionMode) -> PermissionConfig {
        PermissionConfig {
            mode,
            tool_overrides: HashMap::new(),
            shell_auto_approve: vec!["^ls ".into(), "^pwd$".into()],
            shell_always_block: vec!["rm -rf /".into()],
            file_write_allow_prefixes: vec!["/home/owner/workspace".into()],
            file_write_always_ask_prefixes: vec!["/home/owner/Documents".into()],
        }
    }

    #[test]
    fn protected_path_write_is_fatal_regardless_of_mode() {
        let cfg = base_cfg(PermissionMode::FullAuto);
        let input = PermissionCheckInput {
            tool_name: "write_file",
            permission_level: PermissionLevel::Moderate,
            target_path: Some(Path::new("/protected/config.toml")),
            shell_command: None,
            protected_prefixes: &["/protected".to_string()],
        };
        assert_eq!(
            decide(&cfg, &input),
            PermissionDecision::RejectFatal("refusing to write protected path: /protected/config.toml".into())
        );
    }

    #[test]
    fn blacklisted_shell_command_is_fatal() {
        let cfg = base_cfg(PermissionMode::FullAuto);
        let input = PermissionCheckInput {
            tool_name: "exec",
            permission_level: PermissionLevel::Destructive,
            target_path: None,
            shell_command: Some("rm -rf /"),
            protected_prefixes: &[],
        };
        matches!(decide(&cfg, &input), PermissionDecision::RejectFatal(_));
    }

    #[test]
    fn critical_always_needs_approval_even_in_full_auto() {
        let cfg = base_cfg(PermissionMode::FullAuto);
        let input = PermissionCheckInput {
            tool_name: "crypto_send",
            permission_level: PermissionLevel::Critical,
            target_path: None,
            shell_command: None,
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &input), PermissionDecision::RequireApproval);
    }

    #[test]
    fn smart_auto_allows_safe_and_gates_moderate() {
        let cfg = base_cfg(PermissionMode::SmartAuto);
        let safe_input = PermissionCheckInput {
            tool_name: "read_file",
            permission_level: PermissionLevel::Safe,
            target_path: None,
            shell_command: None,
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &safe_input), PermissionDecision::Allow);

        let moderate_input = PermissionCheckInput {
            tool_name: "exec",
            permission_level: PermissionLevel::Moderate,
            target_path: None,
            shell_command: Some("ls -la"),
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &moderate_input), PermissionDecision::Allow);

        let moderate_unmatched = PermissionCheckInput {
            tool_name: "exec",
            permission_level: PermissionLevel::Moderate,
            target_path: None,
            shell_command: Some("curl http://example.com"),
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &moderate_unmatched), PermissionDecision::RequireApproval);
    }

    #[test]
    fn ask_always_gates_everything_but_safe() {
        let cfg = base_cfg(PermissionMode::AskAlways);
        let moderate_input = PermissionCheckInput {
            tool_name: "write_file",
            permission_level: PermissionLevel::Moderate,
            target_path: Some(Path::new("/home/owner/workspace/notes.md")),
            shell_command: None,
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &moderate_input), PermissionDecision::RequireApproval);
    }

    #[test]
    fn tool_override_ask_wins_over_full_auto() {
        let mut cfg = base_cfg(PermissionMode::FullAuto);
        cfg.tool_overrides.insert("crypto_send".into(), ToolOverride::Ask);
        let input = PermissionCheckInput {
            tool_name: "crypto_send",
            permission_level: PermissionLevel::Safe,
            target_path: None,
            shell_command: None,
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &input), PermissionDecision::RequireApproval);
    }

    #[test]
    fn always_ask_prefix_overrides_allow_prefix_mismatch() {
        let cfg = base_cfg(PermissionMode::SmartAuto);
        let input = PermissionCheckInput {
            tool_name: "write_file",
            permission_level: PermissionLevel::Moderate,
            target_path: Some(Path::new("/home/owner/Documents/taxes.pdf")),
            shell_command: None,
            protected_prefixes: &[],
        };
        assert_eq!(decide(&cfg, &input), PermissionDecision::RequireApproval);
    }
}
