//! Error taxonomy raised inside checks, caught at the pipeline boundary (§4.4, §7).

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The plugin must not run; the pipeline reports "ignored". The string is user-facing.
    #[error("skip plugin: {0}")]
    SkipPlugin(String),
    /// The pipeline must not run later cost steps; the plugin runs.
    #[error("is superuser")]
    IsSuperuser,
    /// Non-fatal absence of prerequisites; plugin runs without cost.
    #[error("permission exemption: {0}")]
    PermissionExemption(String),
    /// Anything else: logged and swallowed, check treated as "no objection" (fail-open).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Continue,
    Ignored { reason: String },
}
