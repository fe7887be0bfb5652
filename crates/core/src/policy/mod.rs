// Policy kernel (spec §4.6). Protected, code-enforced surface: authority
// tiers, the credential vault, the protected-file guard, log redaction, the
// injection guard, the runtime self-model, and resource guards. Nothing in
// this module is reachable from tool-exposed mutation paths.

pub mod authority;
pub mod injection;
pub mod protected_files;
pub mod redaction;
pub mod resource_guards;
pub mod selfmodel;
pub mod vault;
