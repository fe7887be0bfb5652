// Authority tier gating (spec §4.6). A tool is visible in the LLM's tool
// list for a session only if the tool's required tier is <= the session's
// tier; execution re-checks independently so a stale tool list can never
// grant access.

use crate::atoms::error::{CoreError, CoreResult};
use crate::atoms::types::AuthorityTier;

pub fn is_visible(session_tier: AuthorityTier, required_tier: AuthorityTier) -> bool {
    required_tier <= session_tier
}

pub fn check_execution(session_tier: AuthorityTier, required_tier: AuthorityTier, tool_name: &str) -> CoreResult<()> {
    if is_visible(session_tier, required_tier) {
        Ok(())
    } else {
        Err(CoreError::Permission(format!(
            "tool '{tool_name}' requires authority tier {required_tier:?}, session has {session_tier:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_sees_everything() {
        assert!(is_visible(AuthorityTier::Owner, AuthorityTier::Public));
        assert!(is_visible(AuthorityTier::Owner, AuthorityTier::Trusted));
        assert!(is_visible(AuthorityTier::Owner, AuthorityTier::Owner));
    }

    #[test]
    fn public_cannot_see_owner_tools() {
        assert!(!is_visible(AuthorityTier::Public, AuthorityTier::Owner));
    }

    #[test]
    fn execution_check_mirrors_visibility() {
        assert!(check_execution(AuthorityTier::Trusted, AuthorityTier::Trusted, "shell_execute").is_ok());
        assert!(check_execution(AuthorityTier::Public, AuthorityTier::Trusted, "shell_execute").is_err());
    }
}
