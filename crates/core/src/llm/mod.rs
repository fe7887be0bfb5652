// LLM layer (spec §4.4): provider adapters, the task-type router that picks
// among them with fallback, and the truncation-detection heuristic applied
// to every normalized response.

pub mod providers;
pub mod router;
pub mod truncation;

pub use router::{RouteRequest, Router, RoutedResponse};
