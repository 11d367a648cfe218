//! Bulk operations via a filter-bound targeter (§4.5.6).

use super::job::{ScheduledJob, TargetType};
use super::manager::SchedulerManager;
use crate::common::entity_ids::ScheduledJobId;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct TargeterFilter {
    #[builder(default, setter(strip_option))]
    pub id: Option<ScheduledJobId>,
    #[builder(default, setter(strip_option))]
    pub id_in: Option<Vec<ScheduledJobId>>,
    #[builder(default, setter(strip_option))]
    pub plugin_name: Option<String>,
    #[builder(default, setter(strip_option))]
    pub target_type: Option<TargetType>,
    #[builder(default, setter(strip_option))]
    pub target_identifier: Option<String>,
    #[builder(default, setter(strip_option))]
    pub target_identifier_in: Option<Vec<String>>,
    #[builder(default, setter(strip_option))]
    pub bot_id: Option<String>,
}

impl TargeterFilter {
    fn matches(&self, job: &ScheduledJob) -> bool {
        if let Some(id) = self.id {
            if job.id != id {
                return false;
            }
        }
        if let Some(ids) = &self.id_in {
            if !ids.contains(&job.id) {
                return false;
            }
        }
        if let Some(plugin_name) = &self.plugin_name {
            if &job.plugin_name != plugin_name {
                return false;
            }
        }
        if let Some(target_type) = self.target_type {
            if job.target_type != target_type {
                return false;
            }
        }
        if let Some(identifier) = &self.target_identifier {
            if &job.target_identifier != identifier {
                return false;
            }
        }
        if let Some(identifiers) = &self.target_identifier_in {
            if !identifiers.contains(&job.target_identifier) {
                return false;
            }
        }
        if let Some(bot_id) = &self.bot_id {
            if job.bot_id.as_deref() != Some(bot_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Binds a filter to a live [`SchedulerManager`] and applies bulk operations
/// to every matching row, synchronizing the live scheduler for each.
pub struct Targeter<'a> {
    manager: &'a SchedulerManager,
    filter: TargeterFilter,
}

impl<'a> Targeter<'a> {
    pub fn new(manager: &'a SchedulerManager, filter: TargeterFilter) -> Self {
        Self { manager, filter }
    }

    pub async fn matching(&self) -> Result<Vec<ScheduledJob>, sqlx::Error> {
        let all = ScheduledJob::all_enabled(self.manager.pool()).await?;
        Ok(all.into_iter().filter(|job| self.filter.matches(job)).collect())
    }

    pub async fn pause(&self) -> Result<usize, sqlx::Error> {
        let matches = self.matching().await?;
        let count = matches.len();
        for job in matches {
            self.manager.pause_schedule(job.id).await?;
        }
        Ok(count)
    }

    pub async fn resume(&self) -> Result<usize, sqlx::Error> {
        let matches = self.matching().await?;
        let count = matches.len();
        for job in matches {
            self.manager.resume_schedule(job.id).await?;
        }
        Ok(count)
    }

    pub async fn remove(&self) -> Result<usize, sqlx::Error> {
        let matches = self.matching().await?;
        let count = matches.len();
        for job in matches {
            self.manager.remove_schedule(job.id).await?;
        }
        Ok(count)
    }
}
