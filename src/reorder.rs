//! Pure computation of new lane/task orders from a finished drag gesture.
//!
//! These functions are synchronous and side-effect-free so the optimistic
//! update they feed is instantaneous from the user's perspective. Each one
//! returns lists with every element's `order` restamped to its new array
//! index, fully describing the post-drag state.
//!
//! Caller contract: cancelled drops (`destination == None`) and same-position
//! drops are short-circuited by the controller before these run, and indices
//! are valid positions in their lists. Out-of-range indices are a programmer
//! error, not a condition handled here.

use serde::{Deserialize, Serialize};

use crate::models::{LaneWithTasks, Task};

/// What kind of item a drag gesture moved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    Lane,
    Task,
}

/// One end of a drag: the droppable container plus an index within it.
/// For lane drags the container is the board (its id); for task drags it is
/// the owning lane's id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DragLocation {
    pub droppable_id: i64,
    pub index: usize,
}

/// The payload produced when a drag-and-drop gesture ends. `destination` is
/// `None` when the item was dropped outside any valid target (cancelled).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DropResult {
    pub kind: DragKind,
    pub source: DragLocation,
    pub destination: Option<DragLocation>,
}

impl DropResult {
    /// True when the drop would leave the item exactly where it started.
    pub fn is_noop(&self) -> bool {
        match &self.destination {
            None => true,
            Some(dest) => {
                dest.droppable_id == self.source.droppable_id && dest.index == self.source.index
            }
        }
    }
}

/// Result of moving a task across lanes: both affected task lists restamped,
/// plus the moved task (carrying its new `lane_id` and `order`) so the caller
/// knows which task's lane membership changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossLaneMove {
    pub source_tasks: Vec<Task>,
    pub dest_tasks: Vec<Task>,
    pub moved: Task,
}

fn restamp_tasks(tasks: &mut [Task]) {
    for (i, task) in tasks.iter_mut().enumerate() {
        task.order = i as i64;
    }
}

/// Move the lane at `source.index` to `destination.index`, restamping every
/// lane's `order` with its new position. Relative order of the other lanes is
/// preserved.
pub fn reorder_lanes(lanes: &[LaneWithTasks], result: &DropResult) -> Vec<LaneWithTasks> {
    let dest = match &result.destination {
        Some(dest) => dest,
        None => return lanes.to_vec(),
    };
    let mut new_lanes = lanes.to_vec();
    let moved = new_lanes.remove(result.source.index);
    new_lanes.insert(dest.index, moved);
    for (i, lane) in new_lanes.iter_mut().enumerate() {
        lane.lane.order = i as i64;
    }
    new_lanes
}

/// Move a task within one lane (source and destination droppable are the same
/// lane). Returns that lane's task list with every `order` restamped.
pub fn reorder_tasks_same_lane(lanes: &[LaneWithTasks], result: &DropResult) -> Vec<Task> {
    let source = &result.source;
    let dest = match &result.destination {
        Some(dest) => dest,
        None => return Vec::new(),
    };
    let mut tasks: Vec<Task> = lanes
        .iter()
        .find(|lane| lane.lane.id == source.droppable_id)
        .map(|lane| lane.tasks.clone())
        .unwrap_or_default();
    let moved = tasks.remove(source.index);
    tasks.insert(dest.index, moved);
    restamp_tasks(&mut tasks);
    tasks
}

/// Move a task from one lane to another. The moved task is re-parented onto
/// the destination lane and both lists are restamped; the combined result is
/// two independently contiguous zero-based orders.
pub fn reorder_tasks_between_lanes(lanes: &[LaneWithTasks], result: &DropResult) -> CrossLaneMove {
    let source = &result.source;
    let dest = result.destination.unwrap_or(result.source);

    let mut source_tasks: Vec<Task> = lanes
        .iter()
        .find(|lane| lane.lane.id == source.droppable_id)
        .map(|lane| lane.tasks.clone())
        .unwrap_or_default();
    let mut dest_tasks: Vec<Task> = lanes
        .iter()
        .find(|lane| lane.lane.id == dest.droppable_id)
        .map(|lane| lane.tasks.clone())
        .unwrap_or_default();

    let mut moved = source_tasks.remove(source.index);
    moved.lane_id = dest.droppable_id;
    dest_tasks.insert(dest.index, moved);

    restamp_tasks(&mut source_tasks);
    restamp_tasks(&mut dest_tasks);

    let moved = dest_tasks[dest.index].clone();
    CrossLaneMove {
        source_tasks,
        dest_tasks,
        moved,
    }
}
