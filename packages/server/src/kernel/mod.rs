// Kernel - core infrastructure with dependency injection
//
// The ServerKernel holds all server dependencies (database, collaborators,
// registries) and provides dependency injection through traits for
// testability.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.

pub mod scheduled_tasks;
pub mod server_kernel;
pub mod test_dependencies;
pub mod traits;

pub use server_kernel::ServerKernel;
pub use test_dependencies::{
    MockBotRegistry, MockGroupStore, MockUserStore, SpyMessageSink, TestDependencies, TrivialCommandParser,
};
pub use traits::*;
