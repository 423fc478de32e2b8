pub mod expiry;
pub mod orchestrator;
pub mod queue;
pub mod scoring;
pub mod stats;
pub mod store;

pub use expiry::ExpiryMonitor;
pub use orchestrator::Orchestrator;
pub use queue::VerifyQueue;
pub use stats::StatsService;
pub use store::{build_store, MemoryStore, PaymentRecord, RedisStore, VerificationStore};
