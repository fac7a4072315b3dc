// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical span attribute keys.
//!
//! All span attributes use these names so downstream queries never have to
//! guess. Task-scoped attributes carry the `task.` prefix; project scoping
//! uses `project.id`.

/// Task title.
pub const TITLE: &str = "task.title";
/// Task kind (`epic`, `story`, ...).
pub const KIND: &str = "task.type";
/// Lifecycle status (`todo`, `in_progress`, ...).
pub const STATUS: &str = "task.status";
/// Priority (`critical`, `high`, `medium`, `low`).
pub const PRIORITY: &str = "task.priority";
/// Assignee, when set.
pub const ASSIGNEE: &str = "task.assignee";
/// Story points, when estimated.
pub const STORY_POINTS: &str = "task.story_points";
/// Labels attached to the task.
pub const LABELS: &str = "task.labels";
/// Sprint the task belongs to.
pub const SPRINT_ID: &str = "task.sprint_id";
/// Parent task reference.
pub const PARENT_ID: &str = "task.parent_id";
/// Tasks this task depends on.
pub const DEPENDS_ON: &str = "task.depends_on";
/// Percent complete in `[0, 100]`.
pub const PERCENT_COMPLETE: &str = "task.percent_complete";
/// Owning project.
pub const PROJECT_ID: &str = "project.id";
/// Sprint name (sprint spans only).
pub const SPRINT_NAME: &str = "sprint.name";
/// Sprint goal (sprint spans only).
pub const SPRINT_GOAL: &str = "sprint.goal";
/// Planned points (sprint spans only).
pub const SPRINT_PLANNED_POINTS: &str = "sprint.planned_points";
