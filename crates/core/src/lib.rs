// agentcore: the engine behind a single autonomous agent install. Owns
// config, the encrypted vault, the persistent store, and the tool registry
// as explicit, passed-around state (spec §9 "Global mutable state ->
// explicit holders") rather than process-global singletons. Short-lived
// borrowing views (`Router`, `Executor`) are constructed on demand from
// this context rather than stored inside it, since they borrow several of
// its fields at once.

pub mod atoms;
pub mod config;
pub mod gateway;
pub mod goalrunner;
pub mod llm;
pub mod mind;
pub mod pipeline;
pub mod policy;
pub mod skills;
pub mod store;
pub mod tools;

use atoms::error::{CoreError, CoreResult};
use config::Config;
use llm::Router;
use pipeline::executor::Executor;
use policy::selfmodel::compute_fingerprint;
use policy::vault::Vault;
use store::Store;
use tools::registry::ToolRegistry;

/// Everything a running install needs, assembled once at startup and
/// threaded by reference into every component that needs it.
pub struct AgentContext {
    pub config: Config,
    pub store: Store,
    pub vault: Vault,
    pub registry: ToolRegistry,
    pub workspace_dir: std::path::PathBuf,
    pub fingerprint: String,
}

impl AgentContext {
    /// Opens (or initializes) the data directory: store, vault, and the
    /// first-boot identity fingerprint (spec §4.6, §6.5). Returns
    /// `CoreError::FingerprintMismatch` if a previously stamped fingerprint
    /// doesn't match what this config + vault salt recompute to.
    pub fn bootstrap(config: Config, data_dir: std::path::PathBuf, master_password: &str) -> CoreResult<Self> {
        std::fs::create_dir_all(&data_dir).map_err(CoreError::Io)?;

        let store_path = data_dir.join(atoms::constants::STORE_FILE_NAME);
        let store = Store::open(&store_path)?;

        let vault = Vault::open(&data_dir, master_password)?;

        let config_bytes = toml::to_string(&config).unwrap_or_default().into_bytes();
        let salt_path = data_dir.join(atoms::constants::VAULT_SALT_FILE_NAME);
        let vault_salt = std::fs::read(&salt_path).unwrap_or_default();

        let fingerprint_path = data_dir.join(atoms::constants::FINGERPRINT_FILE_NAME);
        let fingerprint = match std::fs::read_to_string(&fingerprint_path) {
            Ok(raw) => {
                let stamp: FingerprintStamp = serde_json::from_str(&raw).map_err(|e| CoreError::Migration(e.to_string()))?;
                let computed = compute_fingerprint(&config_bytes, &vault_salt, stamp.first_boot_timestamp);
                policy::selfmodel::verify_fingerprint(&stamp.fingerprint, &computed)?;
                stamp.fingerprint
            }
            Err(_) => {
                let first_boot_timestamp = chrono::Utc::now().timestamp();
                let computed = compute_fingerprint(&config_bytes, &vault_salt, first_boot_timestamp);
                let stamp = FingerprintStamp { fingerprint: computed.clone(), first_boot_timestamp };
                std::fs::write(&fingerprint_path, serde_json::to_string(&stamp).unwrap()).map_err(CoreError::Io)?;
                computed
            }
        };

        let registry = ToolRegistry::new(tools::builtin::builtin_contracts());
        let workspace_dir = data_dir.join("workspace");
        std::fs::create_dir_all(&workspace_dir).map_err(CoreError::Io)?;

        Ok(AgentContext { config, store, vault, registry, workspace_dir, fingerprint })
    }

    /// Builds a fresh LLM router view over this context's config/vault/store.
    pub fn router(&self) -> Router<'_> {
        Router { cfg: &self.config.llm, vault: &self.vault, store: &self.store }
    }

    /// Builds an execution pipeline view. `router` is passed in rather than
    /// constructed inline so the caller controls its lifetime relative to
    /// other borrows of `self`.
    pub fn executor<'a>(&'a self, router: &'a Router<'a>) -> Executor<'a> {
        Executor { cfg: &self.config, store: &self.store, router, registry: &self.registry, workspace_dir: &self.workspace_dir }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct FingerprintStamp {
    fingerprint: String,
    first_boot_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_idempotent_across_restarts() {
        let dir = std::env::temp_dir().join(format!("agentcore-ctx-test-{}", uuid::Uuid::new_v4()));
        let cfg = Config::default();

        let first = AgentContext::bootstrap(cfg.clone(), dir.clone(), "correct horse battery staple").unwrap();
        let fp1 = first.fingerprint.clone();
        drop(first);

        let second = AgentContext::bootstrap(cfg, dir.clone(), "correct horse battery staple").unwrap();
        assert_eq!(fp1, second.fingerprint);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn builtin_tools_are_registered() {
        let dir = std::env::temp_dir().join(format!("agentcore-ctx-test-{}", uuid::Uuid::new_v4()));
        let ctx = AgentContext::bootstrap(Config::default(), dir.clone(), "correct horse battery staple").unwrap();
        assert!(ctx.registry.get("read_file").is_some());
        assert!(ctx.registry.get("shell_execute").is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
