// Built-in tool contracts (spec §4.2, §4.6). Filesystem and shell access,
// each scoped to the caller's workspace directory and gated by the same
// path-traversal and sensitive-path checks regardless of which session
// invokes them.

use super::contract::{FnToolHandler, ToolContext, ToolContract};
use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::{AuthorityTier, PermissionLevel};
use serde_json::json;

const SENSITIVE_PATH_FRAGMENTS: &[&str] = &[".ssh", ".gnupg", ".aws/credentials", ".docker/config.json", ".kube/config", "/etc/shadow", "/etc/passwd"];

fn resolve_in_workspace(workspace_dir: &std::path::Path, raw_path: &str, operation: &str) -> CoreResult<std::path::PathBuf> {
    if raw_path.contains("..") {
        return Err(CoreError::Safety(format!("{operation}: '{raw_path}' attempts to traverse out of the workspace")));
    }
    let resolved = if std::path::Path::new(raw_path).is_absolute() { std::path::PathBuf::from(raw_path) } else { workspace_dir.join(raw_path) };
    let lower = resolved.to_string_lossy().to_lowercase();
    if SENSITIVE_PATH_FRAGMENTS.iter().any(|frag| lower.contains(frag)) {
        return Err(CoreError::Safety(format!("{operation}: '{raw_path}' touches a protected credential path")));
    }
    Ok(resolved)
}

fn read_file_contract() -> ToolContract {
    ToolContract {
        name: "read_file",
        description: "Read the contents of a text file within the workspace.",
        input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        permission_level: PermissionLevel::Safe,
        authority_tier_required: AuthorityTier::Public,
        sensitive_params: &[],
        is_writer: false,
        handler: Box::new(FnToolHandler(|ctx: ToolContext<'_>, args: serde_json::Value| {
            let workspace = ctx.workspace_dir.to_path_buf();
            async move {
                let path = args.get("path").and_then(|v| v.as_str()).ok_or_else(|| CoreError::tool("read_file", "missing 'path'"))?;
                let resolved = resolve_in_workspace(&workspace, path, "read_file")?;
                std::fs::read_to_string(&resolved).map_err(|e| CoreError::tool("read_file", format!("{}: {e}", resolved.display())))
            }
        })),
    }
}

fn write_file_contract() -> ToolContract {
    ToolContract {
        name: "write_file",
        description: "Write (overwrite) a text file within the workspace.",
        input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]}),
        permission_level: PermissionLevel::Moderate,
        authority_tier_required: AuthorityTier::Trusted,
        sensitive_params: &[],
        is_writer: true,
        handler: Box::new(FnToolHandler(|ctx: ToolContext<'_>, args: serde_json::Value| {
            let workspace = ctx.workspace_dir.to_path_buf();
            async move {
                let path = args.get("path").and_then(|v| v.as_str()).ok_or_else(|| CoreError::tool("write_file", "missing 'path'"))?;
                let content = args.get("content").and_then(|v| v.as_str()).ok_or_else(|| CoreError::tool("write_file", "missing 'content'"))?;
                let resolved = resolve_in_workspace(&workspace, path, "write_file")?;
                if let Some(parent) = resolved.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| CoreError::tool("write_file", e.to_string()))?;
                }
                std::fs::write(&resolved, content).map_err(|e| CoreError::tool("write_file", format!("{}: {e}", resolved.display())))?;
                Ok(format!("wrote {} bytes to {}", content.len(), resolved.display()))
            }
        })),
    }
}

fn list_directory_contract() -> ToolContract {
    ToolContract {
        name: "list_directory",
        description: "List entries in a workspace directory.",
        input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        permission_level: PermissionLevel::Safe,
        authority_tier_required: AuthorityTier::Public,
        sensitive_params: &[],
        is_writer: false,
        handler: Box::new(FnToolHandler(|ctx: ToolContext<'_>, args: serde_json::Value| {
            let workspace = ctx.workspace_dir.to_path_buf();
            async move {
                let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
                let resolved = resolve_in_workspace(&workspace, path, "list_directory")?;
                let entries = std::fs::read_dir(&resolved).map_err(|e| CoreError::tool("list_directory", format!("{}: {e}", resolved.display())))?;
                let names: Vec<String> = entries.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().to_string()).collect();
                Ok(names.join("\n"))
            }
        })),
    }
}

fn shell_execute_contract() -> ToolContract {
    ToolContract {
        name: "shell_execute",
        description: "Run a shell command in the workspace directory.",
        input_schema: json!({"type": "object", "properties": {"command": {"type": "string"}}, "required": ["command"]}),
        permission_level: PermissionLevel::Destructive,
        authority_tier_required: AuthorityTier::Owner,
        sensitive_params: &[],
        is_writer: true,
        handler: Box::new(FnToolHandler(|ctx: ToolContext<'_>, args: serde_json::Value| {
            let workspace = ctx.workspace_dir.to_path_buf();
            async move {
                let command = args.get("command").and_then(|v| v.as_str()).ok_or_else(|| CoreError::tool("shell_execute", "missing 'command'"))?;
                let output = tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .current_dir(&workspace)
                    .output()
                    .await
                    .map_err(|e| CoreError::tool("shell_execute", e.to_string()))?;
                let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
                if !output.stderr.is_empty() {
                    combined.push_str("\n[stderr]\n");
                    combined.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                Ok(combined)
            }
        })),
    }
}

/// The tool set always registered, independent of configured skills.
pub fn builtin_contracts() -> Vec<ToolContract> {
    vec![read_file_contract(), write_file_contract(), list_directory_contract(), shell_execute_contract()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_attempt_is_rejected() {
        let workspace = std::path::PathBuf::from("/tmp/workspace");
        let result = resolve_in_workspace(&workspace, "../../etc/passwd", "read_file");
        assert!(result.is_err());
    }

    #[test]
    fn sensitive_path_is_rejected() {
        let workspace = std::path::PathBuf::from("/tmp/workspace");
        let result = resolve_in_workspace(&workspace, "/home/user/.ssh/id_rsa", "read_file");
        assert!(result.is_err());
    }

    #[test]
    fn ordinary_relative_path_resolves_under_workspace() {
        let workspace = std::path::PathBuf::from("/tmp/workspace");
        let resolved = resolve_in_workspace(&workspace, "notes.md", "read_file").unwrap();
        assert_eq!(resolved, std::path::PathBuf::from("/tmp/workspace/notes.md"));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("agentcore-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = ToolContext { session_id: "s1", authority_tier: AuthorityTier::Owner, workspace_dir: &dir };

        let write = write_file_contract();
        write.handler.call(&ctx, &json!({"path": "note.txt", "content": "hello"})).await.unwrap();

        let read = read_file_contract();
        let content = read.handler.call(&ctx, &json!({"path": "note.txt"})).await.unwrap();
        assert_eq!(content, "hello");

        std::fs::remove_dir_all(&dir).ok();
    }
}
