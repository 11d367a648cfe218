//! Scheduler admin CLI surface (§6: illustrative, adapted to this platform).
//!
//! Every subcommand resolves to a reply message string rather than a
//! process exit code — the surface is invoked from chat, not a shell.

use crate::common::entity_ids::ScheduledJobId;
use crate::scheduler::{SchedulerManager, TargetType, Targeter, TargeterFilter, TriggerType};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "scheduler_admin", no_binary_name = true)]
pub struct SchedulerAdminCli {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// List schedules matching the given filters.
    View(TargetFilterArgs),
    /// Create or update a schedule.
    Set(SetArgs),
    /// Delete schedules matching the given filters.
    Delete(TargetFilterArgs),
    /// Pause schedules matching the given filters.
    Pause(TargetFilterArgs),
    /// Resume schedules matching the given filters.
    Resume(TargetFilterArgs),
    /// Run a schedule immediately, bypassing `is_enabled`.
    Trigger(IdArgs),
    /// Partially update a schedule's trigger or kwargs.
    Update(UpdateArgs),
    /// Show run history/status for a schedule.
    Status(IdArgs),
    /// List registered schedulable plugins.
    Plugins,
}

#[derive(Debug, Parser)]
pub struct TargetFilterArgs {
    #[arg(short = 'p', long)]
    pub plugin: Option<String>,
    #[arg(short = 'g', long)]
    pub group: Option<String>,
    #[arg(short = 'u', long)]
    pub user: Option<String>,
    #[arg(short = 't', long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub all: bool,
    #[arg(long)]
    pub global: bool,
    #[arg(long)]
    pub bot: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Debug, Parser)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: TargetFilterArgs,
    #[arg(long)]
    pub cron: Option<String>,
    #[arg(long)]
    pub interval: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub daily: Option<String>,
    /// `k=v;k=v` pairs merged into `job_kwargs`.
    #[arg(long)]
    pub kwargs: Option<String>,
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub cron: Option<String>,
    #[arg(long)]
    pub interval: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub kwargs: Option<String>,
}

#[derive(Debug, Parser)]
pub struct IdArgs {
    pub id: String,
}

/// Parses `"k=v;k=v"` into a flat JSON object, the same shape
/// [`crate::kernel::test_dependencies::TrivialCommandParser`] produces.
pub fn parse_kwargs(raw: &str) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for pair in raw.split(';').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default().trim();
        let value = parts.next().unwrap_or_default().trim();
        object.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }
    serde_json::Value::Object(object)
}

fn filter_from_args(args: &TargetFilterArgs) -> TargeterFilter {
    let mut filter = TargeterFilter::default();
    if let Some(plugin) = &args.plugin {
        filter.plugin_name = Some(plugin.clone());
    }
    if let Some(bot) = &args.bot {
        filter.bot_id = Some(bot.clone());
    }
    if let Some(group) = &args.group {
        filter.target_type = Some(TargetType::Group);
        filter.target_identifier = Some(group.clone());
    } else if let Some(user) = &args.user {
        filter.target_type = Some(TargetType::User);
        filter.target_identifier = Some(user.clone());
    } else if let Some(tag) = &args.tag {
        filter.target_type = Some(TargetType::Tag);
        filter.target_identifier = Some(tag.clone());
    } else if args.all {
        filter.target_type = Some(TargetType::AllGroups);
    } else if args.global {
        filter.target_type = Some(TargetType::Global);
    }
    filter
}

/// Builds a `(trigger_type, trigger_config)` pair from whichever of
/// `--cron`/`--interval`/`--date`/`--daily` was supplied.
fn trigger_from_set_args(args: &SetArgs) -> Result<(TriggerType, serde_json::Value), String> {
    if let Some(cron) = &args.cron {
        return parse_cron_fields(cron).map(|v| (TriggerType::Cron, v));
    }
    if let Some(daily) = &args.daily {
        let (hour, minute) = daily
            .split_once(':')
            .ok_or_else(|| format!("--daily expects HH:MM, got {daily:?}"))?;
        return Ok((
            TriggerType::Cron,
            serde_json::json!({
                "minute": minute, "hour": hour, "day": "*", "month": "*", "day_of_week": "*",
            }),
        ));
    }
    if let Some(interval) = &args.interval {
        let (amount, unit) = parse_interval(interval)?;
        return Ok((TriggerType::Interval, serde_json::json!({ "amount": amount, "unit": unit })));
    }
    if let Some(date) = &args.date {
        let run_at: chrono::DateTime<chrono::Utc> =
            date.parse().map_err(|e| format!("--date must be RFC3339: {e}"))?;
        return Ok((TriggerType::Date, serde_json::json!({ "run_at": run_at })));
    }
    Err("one of --cron, --interval, --date or --daily is required".to_string())
}

fn parse_cron_fields(raw: &str) -> Result<serde_json::Value, String> {
    let fields: Vec<&str> = raw.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!("--cron expects 5 space-separated fields, got {raw:?}"));
    }
    Ok(serde_json::json!({
        "minute": fields[0], "hour": fields[1], "day": fields[2],
        "month": fields[3], "day_of_week": fields[4],
    }))
}

fn parse_interval(raw: &str) -> Result<(u64, &'static str), String> {
    let (amount, unit) = raw.split_at(raw.len().saturating_sub(1));
    let amount: u64 = amount.parse().map_err(|_| format!("invalid --interval value {raw:?}"))?;
    let unit = match unit {
        "s" => "seconds",
        "m" => "minutes",
        "h" => "hours",
        "d" => "days",
        "w" => "weeks",
        _ => return Err(format!("--interval unit must be one of s/m/h/d/w, got {raw:?}")),
    };
    Ok((amount, unit))
}

/// Dispatches a parsed command against a live [`SchedulerManager`], returning
/// the reply message that should be sent back to the requester.
pub async fn handle(cli: SchedulerAdminCli, manager: &SchedulerManager) -> String {
    match cli.command {
        AdminCommand::View(args) => {
            let targeter = Targeter::new(manager, filter_from_args(&args));
            match targeter.matching().await {
                Ok(rows) if rows.is_empty() => "no matching schedules".to_string(),
                Ok(rows) => rows
                    .iter()
                    .map(|r| format!("{} [{}] {:?} -> {}", r.id, r.plugin_name, r.target_type, r.target_identifier))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => format!("error listing schedules: {e}"),
            }
        }
        AdminCommand::Set(args) => {
            let plugin_name = match &args.target.plugin {
                Some(p) => p.clone(),
                None => return "-p <plugin> is required for set".to_string(),
            };
            let (target_type, target_identifier) = match resolve_single_target(&args.target) {
                Ok(t) => t,
                Err(e) => return e,
            };
            let (trigger_type, trigger_config) = match trigger_from_set_args(&args) {
                Ok(t) => t,
                Err(e) => return e,
            };
            let job_kwargs = args.kwargs.as_deref().map(parse_kwargs).unwrap_or(serde_json::json!({}));
            match manager
                .add_schedule(
                    &plugin_name,
                    None,
                    args.target.bot.as_deref(),
                    target_type,
                    &target_identifier,
                    trigger_type,
                    trigger_config,
                    job_kwargs,
                    None,
                )
                .await
            {
                Ok(row) => format!("scheduled {}", row.id),
                Err(e) => format!("error scheduling: {e}"),
            }
        }
        AdminCommand::Delete(args) => report_bulk("deleted", Targeter::new(manager, filter_from_args(&args)).remove().await),
        AdminCommand::Pause(args) => report_bulk("paused", Targeter::new(manager, filter_from_args(&args)).pause().await),
        AdminCommand::Resume(args) => report_bulk("resumed", Targeter::new(manager, filter_from_args(&args)).resume().await),
        AdminCommand::Trigger(args) => match args.id.parse::<ScheduledJobId>() {
            Ok(id) => match manager.trigger_now(id).await {
                Ok(()) => format!("triggered {id}"),
                Err(e) => format!("error triggering {id}: {e}"),
            },
            Err(_) => format!("invalid schedule id: {}", args.id),
        },
        AdminCommand::Update(args) => {
            let id: ScheduledJobId = match args.id.parse() {
                Ok(id) => id,
                Err(_) => return format!("invalid schedule id: {}", args.id),
            };
            let trigger = if args.cron.is_some() || args.interval.is_some() || args.date.is_some() {
                let set_args = SetArgs {
                    target: TargetFilterArgs { plugin: None, group: None, user: None, tag: None, all: false, global: false, bot: None, page: 1 },
                    cron: args.cron.clone(),
                    interval: args.interval.clone(),
                    date: args.date.clone(),
                    daily: None,
                    kwargs: None,
                };
                match trigger_from_set_args(&set_args) {
                    Ok((t, c)) => Some((t, c)),
                    Err(e) => return e,
                }
            } else {
                None
            };
            let job_kwargs = args.kwargs.as_deref().map(parse_kwargs);
            let (trigger_type, trigger_config) = match trigger {
                Some((t, c)) => (Some(t), Some(c)),
                None => (None, None),
            };
            match manager.update_schedule(id, trigger_type, trigger_config, job_kwargs).await {
                Ok(row) => format!("updated {}", row.id),
                Err(e) => format!("error updating {id}: {e}"),
            }
        }
        AdminCommand::Status(args) => format!("status lookup for {} is not yet wired to a history table", args.id),
        AdminCommand::Plugins => "plugin listing is read from the running process's SchedulePluginRegistry".to_string(),
    }
}

fn resolve_single_target(args: &TargetFilterArgs) -> Result<(TargetType, String), String> {
    if let Some(group) = &args.group {
        return Ok((TargetType::Group, group.clone()));
    }
    if let Some(user) = &args.user {
        return Ok((TargetType::User, user.clone()));
    }
    if let Some(tag) = &args.tag {
        return Ok((TargetType::Tag, tag.clone()));
    }
    if args.all {
        return Ok((TargetType::AllGroups, String::new()));
    }
    if args.global {
        return Ok((TargetType::Global, String::new()));
    }
    Err("one of -g, -u, -t, --all or --global is required".to_string())
}

fn report_bulk(verb: &str, result: Result<usize, sqlx::Error>) -> String {
    match result {
        Ok(count) => format!("{verb} {count} schedule(s)"),
        Err(e) => format!("error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_view_subcommand_with_plugin_flag() {
        let cli = SchedulerAdminCli::try_parse_from(["view", "-p", "greet"]).unwrap();
        match cli.command {
            AdminCommand::View(args) => assert_eq!(args.plugin.as_deref(), Some("greet")),
            _ => panic!("expected view"),
        }
    }

    #[test]
    fn parses_set_subcommand_with_cron_and_kwargs() {
        let cli = SchedulerAdminCli::try_parse_from([
            "set", "-p", "greet", "-g", "100", "--cron", "0 8 * * *", "--kwargs", "text=hi",
        ])
        .unwrap();
        match cli.command {
            AdminCommand::Set(args) => {
                assert_eq!(args.target.group.as_deref(), Some("100"));
                assert_eq!(args.cron.as_deref(), Some("0 8 * * *"));
                assert_eq!(args.kwargs.as_deref(), Some("text=hi"));
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn kwargs_string_parses_into_flat_object() {
        let parsed = parse_kwargs("text=hi;count=3");
        assert_eq!(parsed.get("text").unwrap(), "hi");
        assert_eq!(parsed.get("count").unwrap(), "3");
    }

    #[test]
    fn plugins_subcommand_takes_no_arguments() {
        let cli = SchedulerAdminCli::try_parse_from(["plugins"]).unwrap();
        assert!(matches!(cli.command, AdminCommand::Plugins));
    }
}
