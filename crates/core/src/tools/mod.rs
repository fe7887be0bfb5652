// Tool layer (spec §4.2). The Tool Contract, the frozen registry built from
// it at startup, and the sanitization pipeline applied to every tool
// result before it re-enters LLM context.

pub mod builtin;
pub mod contract;
pub mod registry;
pub mod sanitize;
