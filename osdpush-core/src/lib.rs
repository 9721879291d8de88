#[cfg(test)]
#[macro_use]
mod test_macros;

pub mod config;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod push;
pub mod refresh;
pub mod schedule_resolver;
pub mod state_store;
pub mod timer_collector;
pub mod tracing_ext;

mod serde_ext;
