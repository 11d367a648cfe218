//! Typed ID definitions for all domain entities.
//!
//! This module defines type aliases for each domain entity, providing
//! compile-time type safety for ID usage throughout the application.
//!
//! # Example
//!
//! ```rust
//! use server_core::common::{ScheduledJobId, GroupTagId};
//!
//! let job_id: ScheduledJobId = ScheduledJobId::new();
//! let tag_id: GroupTagId = GroupTagId::new();
//!
//! // This would be a compile error:
//! // let wrong: GroupTagId = job_id;
//! ```

// Re-export the core Id type and version markers
pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for ScheduledJob rows (persistent scheduler entries).
pub struct ScheduledJobMarker;

/// Marker type for GroupTag rows (named tags owned by a bot).
pub struct GroupTagMarker;

/// Marker type for GroupTagLink rows (tag-to-group membership).
pub struct GroupTagLinkMarker;

/// Marker type for GroupPluginSetting rows (per-group plugin overrides).
pub struct GroupPluginSettingMarker;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for ScheduledJob rows.
pub type ScheduledJobId = Id<ScheduledJobMarker>;

/// Typed ID for GroupTag rows.
pub type GroupTagId = Id<GroupTagMarker>;

/// Typed ID for GroupTagLink rows.
pub type GroupTagLinkId = Id<GroupTagLinkMarker>;

/// Typed ID for GroupPluginSetting rows.
pub type GroupPluginSettingId = Id<GroupPluginSettingMarker>;
