//! Quest State Tracking
//!
//! Per-player run records. Quest definitions are shared and never hold
//! player state; everything a player changes lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;
use super::{QuestId, StageId};

/// Status of a quest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Completed,
    Abandoned,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Completed => "completed",
            RunStatus::Abandoned => "abandoned",
        }
    }
}

/// Progress on a single task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,
    pub current: u32,
    pub target: u32,
    pub completed: bool,
}

impl TaskProgress {
    pub fn new(task_id: &str, target: u32) -> Self {
        Self {
            task_id: task_id.to_string(),
            current: 0,
            target,
            completed: false,
        }
    }

    /// Add progress and return true if newly completed
    pub fn add_progress(&mut self, amount: u32) -> bool {
        if self.completed {
            return false;
        }
        self.current = self.current.saturating_add(amount).min(self.target);
        if self.current >= self.target {
            self.completed = true;
            true
        } else {
            false
        }
    }

    /// Mark as complete regardless of count
    pub fn force_complete(&mut self) {
        self.current = self.target;
        self.completed = true;
    }
}

/// Task progress for one active stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage_id: StageId,
    pub tasks: Vec<TaskProgress>,
}

impl StageProgress {
    pub fn new(stage: &Stage) -> Self {
        Self {
            stage_id: stage.id,
            tasks: stage
                .tasks
                .iter()
                .map(|task| TaskProgress::new(&task.id, task.task.required()))
                .collect(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskProgress> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskProgress> {
        self.tasks.iter_mut().find(|task| task.task_id == task_id)
    }

    pub fn is_task_completed(&self, task_id: &str) -> bool {
        self.task(task_id).is_some_and(|task| task.completed)
    }
}

/// Where a run stands with respect to branching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BranchState {
    /// `origin` is active and offers several next stages
    AtBranchPoint {
        origin: StageId,
        candidates: Vec<StageId>,
    },
    /// The player chose `stage` when leaving `origin`
    FollowingBranch { origin: StageId, stage: StageId },
    /// The followed branch ended with `stage`
    Completed { stage: StageId },
    /// The run was abandoned mid-branch
    Cancelled,
}

/// A player's run of one quest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRun {
    pub quest_id: QuestId,
    pub status: RunStatus,
    /// Stages currently being worked on
    pub active: Vec<StageProgress>,
    /// Finished stages, in completion order
    #[serde(default)]
    pub completed_stages: Vec<StageId>,
    /// Branch candidates this player can no longer take
    #[serde(default)]
    pub cancelled_stages: Vec<StageId>,
    #[serde(default)]
    pub branch: Option<BranchState>,
    /// Authored stage whose successor follows the current branch
    #[serde(default)]
    pub resume_after: Option<StageId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestRun {
    pub fn new(quest_id: QuestId) -> Self {
        Self {
            quest_id,
            status: RunStatus::Active,
            active: Vec::new(),
            completed_stages: Vec::new(),
            cancelled_stages: Vec::new(),
            branch: None,
            resume_after: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_stage_active(&self, stage_id: StageId) -> bool {
        self.active.iter().any(|stage| stage.stage_id == stage_id)
    }

    pub fn stage(&self, stage_id: StageId) -> Option<&StageProgress> {
        self.active.iter().find(|stage| stage.stage_id == stage_id)
    }

    pub fn is_stage_completed(&self, stage_id: StageId) -> bool {
        self.completed_stages.contains(&stage_id)
    }

    pub fn is_stage_cancelled(&self, stage_id: StageId) -> bool {
        self.cancelled_stages.contains(&stage_id)
    }

    /// Move a stage from the active set to the completed list
    pub fn complete_stage(&mut self, stage_id: StageId) {
        self.active.retain(|stage| stage.stage_id != stage_id);
        if !self.is_stage_completed(stage_id) {
            self.completed_stages.push(stage_id);
        }
    }

    /// Rule a stage out for this player only
    pub fn cancel_stage(&mut self, stage_id: StageId) {
        self.active.retain(|stage| stage.stage_id != stage_id);
        if !self.is_stage_cancelled(stage_id) {
            self.cancelled_stages.push(stage_id);
        }
    }

    pub fn is_branching(&self) -> bool {
        matches!(
            self.branch,
            Some(BranchState::AtBranchPoint { .. } | BranchState::FollowingBranch { .. })
        )
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn abandon(&mut self) {
        if self.is_branching() {
            self.branch = Some(BranchState::Cancelled);
        }
        self.status = RunStatus::Abandoned;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Abandoned)
    }

    /// Get duration in seconds
    pub fn duration_secs(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds()
    }
}

// ============================================================================
// Progress views
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub description: String,
    pub current: u32,
    pub target: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage_id: StageId,
    pub name: String,
    pub description: String,
    pub status: StageStatus,
    pub tasks: Vec<TaskView>,
}

/// What a player sees of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunView {
    pub quest_id: QuestId,
    pub quest_name: String,
    pub status: RunStatus,
    pub branch: Option<BranchState>,
    pub stages: Vec<StageView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_progress_clamps() {
        let mut task = TaskProgress::new("slimes", 5);
        assert!(!task.add_progress(3));
        assert!(task.add_progress(4));
        assert_eq!(task.current, 5);
        assert!(!task.add_progress(1));

        let mut talk = TaskProgress::new("talk", 1);
        talk.force_complete();
        assert!(talk.completed);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut run = QuestRun::new(QuestId::new());
        let stage = StageId::new();
        run.cancel_stage(stage);
        run.cancel_stage(stage);
        assert_eq!(run.cancelled_stages, vec![stage]);
        assert!(!run.is_stage_active(stage));
    }

    #[test]
    fn test_abandon_mid_branch() {
        let mut run = QuestRun::new(QuestId::new());
        run.branch = Some(BranchState::FollowingBranch {
            origin: StageId::new(),
            stage: StageId::new(),
        });
        run.abandon();
        assert_eq!(run.branch, Some(BranchState::Cancelled));
        assert_eq!(run.status, RunStatus::Abandoned);
        assert!(run.is_terminal());

        let mut finished = QuestRun::new(QuestId::new());
        let stage = StageId::new();
        finished.branch = Some(BranchState::Completed { stage });
        finished.abandon();
        assert_eq!(finished.branch, Some(BranchState::Completed { stage }));
    }

    #[test]
    fn test_run_json() {
        let mut run = QuestRun::new(QuestId::new());
        let origin = StageId::new();
        run.branch = Some(BranchState::AtBranchPoint {
            origin,
            candidates: vec![StageId::new()],
        });
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["branch"]["state"], "at_branch_point");
        assert_eq!(json["status"], "active");

        let back: QuestRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, run);
    }
}
