//! Quest Progression
//!
//! Pure functions advancing a [`QuestRun`] through the stage graph. They
//! never touch the graph itself and never give rewards; the quest handler
//! does both around these calls.

use super::definition::Quest;
use super::events::{ProgressUpdate, QuestEvent};
use super::graph::{Attachment, StageGraph};
use super::stage::Stage;
use super::state::{
    BranchState, QuestRun, RunView, StageProgress, StageStatus, StageView, TaskView,
};
use super::StageId;

/// Start a run at the quest's entry stages
pub fn begin(quest: &Quest, graph: &StageGraph) -> QuestRun {
    let mut run = QuestRun::new(quest.id());
    for stage in quest.first_stages() {
        enter_stage(graph, &mut run, stage);
    }
    run
}

/// Make `stage_id` active. Entering a stage that offers branches puts the
/// run at a branch point.
pub fn enter_stage(graph: &StageGraph, run: &mut QuestRun, stage_id: StageId) {
    let Some(stage) = graph.get(stage_id) else {
        return;
    };
    if run.is_stage_active(stage_id) || run.is_stage_cancelled(stage_id) {
        return;
    }

    run.active.push(StageProgress::new(stage));

    let candidates = stage.branch_candidates();
    if !candidates.is_empty() {
        run.branch = Some(BranchState::AtBranchPoint {
            origin: stage_id,
            candidates,
        });
    }
}

/// Result of applying one event to a run
#[derive(Debug, Default)]
pub struct EventOutcome {
    pub updates: Vec<ProgressUpdate>,
    /// (stage, task) pairs completed by the event
    pub completed_tasks: Vec<(StageId, String)>,
    pub completed_stages: Vec<StageId>,
}

impl EventOutcome {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Apply an event to every active stage of the run
pub fn apply_event(graph: &StageGraph, run: &mut QuestRun, event: &QuestEvent) -> EventOutcome {
    let mut outcome = EventOutcome::default();
    let quest_id = run.quest_id;

    for progress in run.active.iter_mut() {
        let Some(stage) = graph.get(progress.stage_id) else {
            continue;
        };

        // Branching tasks wait until every other task of the stage is done
        let gate_open = gating_done(stage, progress);
        let mut branch_chosen = false;
        let mut stage_updates = Vec::new();

        for task in &stage.tasks {
            let branching = task.is_branching();
            if branching && (!gate_open || branch_chosen) {
                continue;
            }

            let amount = task.task.progress(event);
            if amount == 0 {
                continue;
            }
            let Some(task_progress) = progress.task_mut(&task.id) else {
                continue;
            };
            if task_progress.completed {
                continue;
            }

            let newly_completed = task_progress.add_progress(amount);
            stage_updates.push(ProgressUpdate::task_updated(
                quest_id,
                stage.id,
                &task.id,
                task_progress.current,
                task_progress.target,
                newly_completed,
            ));
            if newly_completed {
                outcome.completed_tasks.push((stage.id, task.id.clone()));
                branch_chosen |= branching;
            }
        }

        if !stage_updates.is_empty() && stage_complete(stage, progress) {
            for update in &mut stage_updates {
                update.stage_completed = true;
            }
            outcome.completed_stages.push(stage.id);
        }
        outcome.updates.extend(stage_updates);
    }

    outcome
}

fn gating_done(stage: &Stage, progress: &StageProgress) -> bool {
    stage
        .tasks
        .iter()
        .filter(|task| !task.is_branching())
        .all(|task| progress.is_task_completed(&task.id))
}

/// A plain stage is done when all its tasks are. A branch point is done when
/// its other tasks are and one branching task is.
pub fn stage_complete(stage: &Stage, progress: &StageProgress) -> bool {
    if !stage.has_branching_tasks() {
        return stage
            .tasks
            .iter()
            .all(|task| progress.is_task_completed(&task.id));
    }
    gating_done(stage, progress)
        && stage
            .tasks
            .iter()
            .filter(|task| task.is_branching())
            .any(|task| progress.is_task_completed(&task.id))
}

/// Move the run onto the linked stage `target`, leaving `origin`. Every
/// other candidate of the branch point is cancelled for this run.
pub fn follow_branch(graph: &StageGraph, run: &mut QuestRun, origin: StageId, target: StageId) {
    let candidates = match &run.branch {
        Some(BranchState::AtBranchPoint {
            origin: branch_origin,
            candidates,
        }) if *branch_origin == origin => candidates.clone(),
        _ => Vec::new(),
    };
    for candidate in candidates {
        if candidate != target {
            run.cancel_stage(candidate);
        }
    }

    // Nested branches keep resuming after the first authored origin
    if let Some(Attachment::Authored { .. }) = graph.attachment(origin) {
        run.resume_after = Some(origin);
    }

    run.branch = Some(BranchState::FollowingBranch {
        origin,
        stage: target,
    });
    enter_stage(graph, run, target);
}

/// Close a completed stage and open what follows it. `branched` is true when
/// a link from this stage was followed. Returns true when the run has no
/// stages left.
///
/// The end of a branch is read from the run itself, so a restored run
/// resumes after the branch point even when its linked stage is floating.
pub fn finish_stage(
    quest: &Quest,
    graph: &StageGraph,
    run: &mut QuestRun,
    stage_id: StageId,
    branched: bool,
) -> bool {
    run.complete_stage(stage_id);

    if !branched {
        match &run.branch {
            Some(BranchState::AtBranchPoint { origin, .. }) if *origin == stage_id => {
                run.branch = None;
            }
            Some(BranchState::FollowingBranch { stage, .. }) if *stage == stage_id => {
                run.branch = Some(BranchState::Completed { stage: stage_id });
                if let Some(resume) = run.resume_after.take() {
                    if let Some(next) = graph.next_authored(quest, resume) {
                        enter_stage(graph, run, next);
                    }
                }
                return run.active.is_empty();
            }
            _ => {}
        }

        if quest.is_sequential() {
            if let Some(next) = graph.next_authored(quest, stage_id) {
                enter_stage(graph, run, next);
            }
        }
    }

    run.active.is_empty()
}

/// Progress view of a run. Linked stages show exactly like authored ones.
pub fn view(quest: &Quest, graph: &StageGraph, run: &QuestRun) -> RunView {
    let mut stages = Vec::new();

    for stage_id in &run.completed_stages {
        if let Some(stage) = graph.get(*stage_id) {
            let tasks = stage
                .tasks
                .iter()
                .map(|task| {
                    let target = task.task.required();
                    TaskView {
                        task_id: task.id.clone(),
                        description: task.task.describe(),
                        current: target,
                        target,
                        completed: true,
                    }
                })
                .collect();
            stages.push(stage_view(stage, StageStatus::Completed, tasks));
        }
    }

    for progress in &run.active {
        if let Some(stage) = graph.get(progress.stage_id) {
            let tasks = stage
                .tasks
                .iter()
                .filter_map(|task| {
                    let task_progress = progress.task(&task.id)?;
                    Some(TaskView {
                        task_id: task.id.clone(),
                        description: task.task.describe(),
                        current: task_progress.current,
                        target: task_progress.target,
                        completed: task_progress.completed,
                    })
                })
                .collect();
            stages.push(stage_view(stage, StageStatus::Active, tasks));
        }
    }

    for stage_id in &run.cancelled_stages {
        if let Some(stage) = graph.get(*stage_id) {
            stages.push(stage_view(stage, StageStatus::Cancelled, Vec::new()));
        }
    }

    RunView {
        quest_id: quest.id(),
        quest_name: quest.name().to_string(),
        status: run.status,
        branch: run.branch.clone(),
        stages,
    }
}

fn stage_view(stage: &Stage, status: StageStatus, tasks: Vec<TaskView>) -> StageView {
    StageView {
        stage_id: stage.id,
        name: stage.name.clone(),
        description: stage.description.clone(),
        status,
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Location;
    use crate::player::{HostPlayer, PlayerId};
    use crate::quest::events::QuestAction;
    use crate::quest::stage::fixtures::*;
    use crate::quest::QuestId;

    fn talk(npc: &str) -> QuestEvent {
        QuestEvent::new(
            HostPlayer::new(PlayerId::new(), "Alice"),
            Location::new("world1", 0.0, 0.0, 0.0),
            QuestAction::NpcInteraction { npc_id: npc.to_string() },
        )
    }

    fn kill(entity: &str) -> QuestEvent {
        QuestEvent::new(
            HostPlayer::new(PlayerId::new(), "Alice"),
            Location::new("world1", 0.0, 0.0, 0.0),
            QuestAction::MonsterKilled { entity_type: entity.to_string(), level: 1 },
        )
    }

    /// Applies an event and finishes completed stages the way the quest
    /// handler does, without rewards or links
    fn step(quest: &Quest, graph: &StageGraph, run: &mut QuestRun, event: &QuestEvent) -> bool {
        let outcome = apply_event(graph, run, event);
        let mut done = false;
        for stage in outcome.completed_stages {
            done = finish_stage(quest, graph, run, stage, false);
        }
        done
    }

    fn authored(stages: Vec<Stage>) -> (Quest, StageGraph) {
        let mut graph = StageGraph::new();
        let ids: Vec<StageId> = stages.iter().map(|stage| stage.id).collect();
        for stage in stages {
            graph.insert(stage).unwrap();
        }
        let quest = Quest::new(QuestId::new(), "Errands", ids);
        graph.attach_authored(quest.id(), quest.stages()).unwrap();
        (quest, graph)
    }

    #[test]
    fn test_sequential_quest_advances() {
        let (quest, graph) = authored(vec![simple_stage("elder"), simple_stage("smith")]);
        let mut run = begin(&quest, &graph);
        assert_eq!(run.active.len(), 1);

        // Smith is not active yet
        assert!(!step(&quest, &graph, &mut run, &talk("smith")));
        assert!(run.completed_stages.is_empty());

        assert!(!step(&quest, &graph, &mut run, &talk("elder")));
        assert!(run.is_stage_active(quest.stages()[1]));

        assert!(step(&quest, &graph, &mut run, &talk("smith")));
        assert_eq!(run.completed_stages, quest.stages().to_vec());
    }

    #[test]
    fn test_parallel_quest_starts_everywhere() {
        let (quest, graph) = authored(vec![simple_stage("elder"), simple_stage("smith")]);
        let quest = quest.with_sequential(false);
        let mut run = begin(&quest, &graph);
        assert_eq!(run.active.len(), 2);

        assert!(!step(&quest, &graph, &mut run, &talk("smith")));
        assert!(step(&quest, &graph, &mut run, &talk("elder")));
    }

    #[test]
    fn test_counted_progress_updates() {
        let stage = Stage::new(StageId::new(), "Hunt").with_task(kill_task("slimes", "slime", 2));
        let (quest, graph) = authored(vec![stage]);
        let mut run = begin(&quest, &graph);

        let outcome = apply_event(&graph, &mut run, &kill("slime"));
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].current, 1);
        assert!(!outcome.updates[0].task_completed);

        assert!(apply_event(&graph, &mut run, &kill("wolf")).is_empty());

        let outcome = apply_event(&graph, &mut run, &kill("slime"));
        assert!(outcome.updates[0].task_completed);
        assert!(outcome.updates[0].stage_completed);
        assert_eq!(outcome.completed_stages, vec![quest.stages()[0]]);
    }

    /// Branch point: report to the elder, then side with the guard or the
    /// thief; each side links its own floating stage. A final authored stage
    /// follows the branch.
    struct Crossroads {
        quest: Quest,
        graph: StageGraph,
        choice: StageId,
        guard: StageId,
        thief: StageId,
        epilogue: StageId,
    }

    fn crossroads() -> Crossroads {
        let guard = simple_stage("guard_captain");
        let thief = simple_stage("thief_master");
        let choice = Stage::new(StageId::new(), "Choose a side")
            .with_task(talk_task("report", "elder"))
            .with_task(talk_task("guard", "guard_captain").with_reward(link(guard.id)))
            .with_task(talk_task("thief", "thief_master").with_reward(link(thief.id)));
        let epilogue = simple_stage("mayor");

        let mut quest = Quest::new(QuestId::new(), "Crossroads", vec![choice.id, epilogue.id]);
        let (choice_id, guard_id, thief_id, epilogue_id) = (choice.id, guard.id, thief.id, epilogue.id);

        let mut graph = StageGraph::new();
        for stage in [guard, thief, choice, epilogue] {
            graph.insert(stage).unwrap();
        }
        graph.attach_authored(quest.id(), quest.stages()).unwrap();
        quest.check_branches(&graph);
        quest.check_broken(&graph);

        Crossroads {
            quest,
            graph,
            choice: choice_id,
            guard: guard_id,
            thief: thief_id,
            epilogue: epilogue_id,
        }
    }

    #[test]
    fn test_branching_tasks_wait_for_gate() {
        let world = crossroads();
        let mut run = begin(&world.quest, &world.graph);
        assert_eq!(
            run.branch,
            Some(BranchState::AtBranchPoint {
                origin: world.choice,
                candidates: vec![world.guard, world.thief],
            })
        );

        assert!(apply_event(&world.graph, &mut run, &talk("guard_captain")).is_empty());

        let outcome = apply_event(&world.graph, &mut run, &talk("elder"));
        assert!(outcome.completed_stages.is_empty());

        let outcome = apply_event(&world.graph, &mut run, &talk("guard_captain"));
        assert_eq!(outcome.completed_stages, vec![world.choice]);
        assert_eq!(outcome.completed_tasks, vec![(world.choice, "guard".to_string())]);
    }

    #[test]
    fn test_follow_branch_and_resume() {
        let mut world = crossroads();
        let mut run = begin(&world.quest, &world.graph);
        apply_event(&world.graph, &mut run, &talk("elder"));
        apply_event(&world.graph, &mut run, &talk("guard_captain"));

        world.graph.link(world.quest.id(), world.guard).unwrap();
        follow_branch(&world.graph, &mut run, world.choice, world.guard);
        assert!(!finish_stage(&world.quest, &world.graph, &mut run, world.choice, true));

        assert!(run.is_stage_active(world.guard));
        assert!(!run.is_stage_active(world.epilogue));
        assert_eq!(run.cancelled_stages, vec![world.thief]);
        assert_eq!(
            run.branch,
            Some(BranchState::FollowingBranch { origin: world.choice, stage: world.guard })
        );

        assert!(!step(&world.quest, &world.graph, &mut run, &talk("guard_captain")));
        assert_eq!(run.branch, Some(BranchState::Completed { stage: world.guard }));
        assert!(run.is_stage_active(world.epilogue));

        assert!(step(&world.quest, &world.graph, &mut run, &talk("mayor")));
        assert_eq!(
            run.completed_stages,
            vec![world.choice, world.guard, world.epilogue]
        );
    }

    #[test]
    fn test_followed_stage_resumes_while_floating() {
        // A run restored from storage follows a stage the fresh graph never linked
        let world = crossroads();
        let mut run = begin(&world.quest, &world.graph);
        apply_event(&world.graph, &mut run, &talk("elder"));
        apply_event(&world.graph, &mut run, &talk("guard_captain"));
        follow_branch(&world.graph, &mut run, world.choice, world.guard);
        finish_stage(&world.quest, &world.graph, &mut run, world.choice, true);

        let restored: QuestRun = serde_json::from_value(serde_json::to_value(&run).unwrap()).unwrap();
        let mut run = restored;
        assert!(world.graph.is_floating(world.guard));

        assert!(!step(&world.quest, &world.graph, &mut run, &talk("guard_captain")));
        assert_eq!(run.branch, Some(BranchState::Completed { stage: world.guard }));
        assert!(run.is_stage_active(world.epilogue));
        assert!(step(&world.quest, &world.graph, &mut run, &talk("mayor")));
    }

    #[test]
    fn test_failed_link_falls_back_to_authored_order() {
        let world = crossroads();
        let mut run = begin(&world.quest, &world.graph);
        apply_event(&world.graph, &mut run, &talk("elder"));
        let outcome = apply_event(&world.graph, &mut run, &talk("thief_master"));

        for stage in outcome.completed_stages {
            finish_stage(&world.quest, &world.graph, &mut run, stage, false);
        }
        assert_eq!(run.branch, None);
        assert!(run.is_stage_active(world.epilogue));
    }

    #[test]
    fn test_linked_stage_shows_like_authored() {
        let mut world = crossroads();
        let mut run = begin(&world.quest, &world.graph);
        apply_event(&world.graph, &mut run, &talk("elder"));
        apply_event(&world.graph, &mut run, &talk("guard_captain"));
        world.graph.link(world.quest.id(), world.guard).unwrap();
        follow_branch(&world.graph, &mut run, world.choice, world.guard);
        finish_stage(&world.quest, &world.graph, &mut run, world.choice, true);

        let view = view(&world.quest, &world.graph, &run);
        let statuses: Vec<_> = view
            .stages
            .iter()
            .map(|stage| (stage.stage_id, stage.status.clone()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (world.choice, StageStatus::Completed),
                (world.guard, StageStatus::Active),
                (world.thief, StageStatus::Cancelled),
            ]
        );
        let guard = &view.stages[1];
        assert_eq!(guard.name, "guard_captain");
        assert_eq!(guard.tasks[0].description, "Talk to: guard_captain");
    }
}
