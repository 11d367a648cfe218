// Collaborator contracts the core depends on but does not implement (§6).
//
// INFRASTRUCTURE traits only - no business logic.
// Naming convention here departs from the teacher's Base* prefix: these
// mirror the platform's own collaborator names directly.

use crate::scheduler::registry::ParamSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

/// Identity envelope carrying user id, optional group id, optional channel
/// id, and bot identity (GLOSSARY: Session).
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub group_id: Option<String>,
    pub channel_id: Option<String>,
    pub bot_id: String,
}

#[derive(Debug, Clone)]
pub struct Bot {
    pub id: String,
    pub is_online: bool,
    /// Plugin names this bot has blocked (§4.4 step 4: Bot allow-list check).
    pub blocked_plugins: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub id: String,
    pub level: i32,
    /// `false` while the group is sleeping (admin-only commands still run).
    pub status: bool,
    /// Plugins disabled for this group specifically.
    pub block_plugins: HashSet<String>,
    /// Plugins a superuser disabled for this group; reported distinctly
    /// from `block_plugins` (§4.4 step 4: Group admission).
    pub superuser_block_plugins: HashSet<String>,
}

/// Delivers a chat message. Errors are logged, never propagated (§6).
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, session: &Session, message: &str, reply_to: Option<&str>) -> anyhow::Result<()>;
}

/// Logs and swallows a send failure, per the collaborator contract.
pub async fn send_or_log(sink: &dyn MessageSink, session: &Session, message: &str, reply_to: Option<&str>) {
    if let Err(err) = sink.send(session, message, reply_to).await {
        tracing::error!(user_id = %session.user_id, error = %err, "message sink send failed");
    }
}

/// Looks up an online bot, or enumerates a bot's groups (§6).
#[async_trait]
pub trait BotRegistry: Send + Sync {
    async fn get_bot(&self, id: Option<&str>) -> anyhow::Result<Bot>;
    async fn get_group_list(&self, bot: &Bot) -> Vec<Group>;
    /// Looks up one group's admission record by id, or `None` if the bot
    /// does not know this group (§4.4 step 4: Group admission).
    async fn get_group(&self, bot: &Bot, group_id: &str) -> Option<Group>;
}

/// Parses a rule string against a declared parameter schema (§6).
#[async_trait]
pub trait CommandParser: Send + Sync {
    async fn parse(&self, rule: &str, schema: &ParamSchema) -> Result<Value, String>;
}

/// Ban-list lookup (§4.4 step 4: Ban check). Returns `0` if neither the
/// user nor the group is banned, `-1` for a permanent ban, otherwise the
/// number of seconds remaining — the source's own ban-duration convention.
#[async_trait]
pub trait BanStore: Send + Sync {
    async fn ban_remaining(&self, user_id: Option<&str>, group_id: Option<&str>) -> i64;
}

/// Per-user admin level, taking the max of a user's global level and their
/// level within `group_id` when present (§4.4 step 4: Admin level).
#[async_trait]
pub trait AdminLevelStore: Send + Sync {
    async fn user_level(&self, user_id: &str, group_id: Option<&str>) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingSink {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageSink for FailingSink {
        async fn send(&self, _session: &Session, _message: &str, _reply_to: Option<&str>) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("delivery failed"))
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sink = FailingSink { attempts: attempts.clone() };
        let session = Session {
            user_id: "u1".to_string(),
            group_id: None,
            channel_id: None,
            bot_id: "b1".to_string(),
        };
        send_or_log(&sink, &session, "hi", None).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
