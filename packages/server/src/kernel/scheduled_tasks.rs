//! Wires a `ServerKernel` into a running `SchedulerManager` (§4.5 Startup).

use super::server_kernel::ServerKernel;
use super::traits::BotRegistry;
use crate::scheduler::{AdmissionGate, BotAvailability, SchedulerError, SchedulerManager};
use std::sync::Arc;

/// Bridges the kernel's `BotRegistry` collaborator into the scheduler's
/// narrower `BotAvailability` contract.
struct KernelBotAvailability {
    bots: Arc<dyn BotRegistry>,
}

#[async_trait::async_trait]
impl BotAvailability for KernelBotAvailability {
    async fn is_online(&self, bot_id: &str) -> bool {
        self.bots.get_bot(Some(bot_id)).await.is_ok()
    }

    async fn any_online(&self) -> Option<String> {
        self.bots.get_bot(None).await.ok().map(|bot| bot.id)
    }
}

/// Default admission gate: nothing is blocked. Deployments with group/plugin
/// admission rules should supply their own `AdmissionGate`.
struct OpenAdmissionGate;

#[async_trait::async_trait]
impl AdmissionGate for OpenAdmissionGate {
    async fn is_blocked(&self, _group_id: Option<&str>, _plugin_name: &str) -> bool {
        false
    }
}

/// Builds and starts the live scheduler against the kernel's pool and
/// registered plugins, loading persisted rows and declarative defaults.
pub async fn start_scheduler(
    kernel: &ServerKernel,
    concurrency_limit: usize,
) -> Result<SchedulerManager, SchedulerError> {
    let manager = SchedulerManager::new(
        kernel.db_pool.clone(),
        kernel.schedule_plugins.clone(),
        kernel.tag_resolver.clone(),
        Arc::new(KernelBotAvailability {
            bots: kernel.bot_registry.clone(),
        }),
        Arc::new(OpenAdmissionGate),
        concurrency_limit,
    )
    .await?;

    manager.startup().await?;
    manager.start().await?;

    tracing::info!("scheduler started");
    Ok(manager)
}
