//! Optimistic drag-end orchestration for one board view.
//!
//! `BoardView` owns the client-side lane/task cache: a disposable projection
//! of server state, replaced wholesale by [`BoardView::replace_lanes`] when a
//! fresh fetch arrives and patched only by the pure reorder engine's outputs.
//! A drag-end applies the engine's result to the cache synchronously (the
//! user sees the new order before any network round-trip), then issues
//! exactly one persistence call. If that call fails the pre-drag snapshot is
//! restored; leaving the optimistic state visible after a failure would
//! diverge client and server until an unrelated refetch.

use async_trait::async_trait;

use crate::errors::{DragError, StoreError};
use crate::models::{BoardRole, LaneWithTasks, OrderUpdate};
use crate::notify::{BoardSignal, Notifier};
use crate::reorder::{
    CrossLaneMove, DragKind, DropResult, reorder_lanes, reorder_tasks_between_lanes,
    reorder_tasks_same_lane,
};

/// Persistence seam for order batches. Implemented by the server's
/// [`crate::db::DbHandle`]; clients talking to a remote service implement it
/// over their HTTP transport.
#[async_trait]
pub trait OrderStore {
    async fn update_lane_order(
        &self,
        board_id: i64,
        updates: Vec<OrderUpdate>,
    ) -> Result<(), StoreError>;

    async fn update_task_order_same_lane(
        &self,
        board_id: i64,
        updates: Vec<OrderUpdate>,
    ) -> Result<(), StoreError>;

    async fn update_task_order_different_lane(
        &self,
        board_id: i64,
        moved_task_id: i64,
        new_lane_id: i64,
        updates: Vec<OrderUpdate>,
    ) -> Result<(), StoreError>;
}

/// What a handled drag-end amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// Cancelled or same-position drop; zero side effects.
    Ignored,
    /// Local state updated and the new order durably persisted.
    Persisted,
}

pub struct BoardView<S, N> {
    board_id: i64,
    user_id: i64,
    role: BoardRole,
    lanes: Vec<LaneWithTasks>,
    store: S,
    notifier: N,
}

impl<S: OrderStore, N: Notifier> BoardView<S, N> {
    pub fn new(
        board_id: i64,
        user_id: i64,
        role: BoardRole,
        initial: Vec<LaneWithTasks>,
        store: S,
        notifier: N,
    ) -> Self {
        Self {
            board_id,
            user_id,
            role,
            lanes: initial,
            store,
            notifier,
        }
    }

    pub fn lanes(&self) -> &[LaneWithTasks] {
        &self.lanes
    }

    /// Rebuild the cache from a fresh server payload. The cache is never
    /// authoritative; whatever the server returns wins.
    pub fn replace_lanes(&mut self, lanes: Vec<LaneWithTasks>) {
        self.lanes = lanes;
    }

    /// Handle a finished drag gesture.
    ///
    /// The drag affordance is disabled for viewers at the presentation
    /// layer; a call that arrives anyway is rejected before any state
    /// change.
    pub async fn on_drag_end(&mut self, result: DropResult) -> Result<DragOutcome, DragError> {
        if !self.role.can_edit() {
            return Err(DragError::ReadOnly);
        }
        if result.is_noop() {
            return Ok(DragOutcome::Ignored);
        }
        let Some(dest) = result.destination else {
            return Ok(DragOutcome::Ignored);
        };

        let snapshot = self.lanes.clone();

        let persisted = match result.kind {
            DragKind::Lane => {
                let new_lanes = reorder_lanes(&self.lanes, &result);
                let updates: Vec<OrderUpdate> = new_lanes
                    .iter()
                    .map(|l| OrderUpdate {
                        id: l.lane.id,
                        order: l.lane.order,
                    })
                    .collect();
                self.lanes = new_lanes;
                self.store.update_lane_order(self.board_id, updates).await
            }
            DragKind::Task if result.source.droppable_id == dest.droppable_id => {
                let tasks = reorder_tasks_same_lane(&self.lanes, &result);
                let updates: Vec<OrderUpdate> = tasks
                    .iter()
                    .map(|t| OrderUpdate {
                        id: t.id,
                        order: t.order,
                    })
                    .collect();
                if let Some(lane) = self
                    .lanes
                    .iter_mut()
                    .find(|l| l.lane.id == result.source.droppable_id)
                {
                    lane.tasks = tasks;
                }
                self.store
                    .update_task_order_same_lane(self.board_id, updates)
                    .await
            }
            DragKind::Task => {
                let CrossLaneMove {
                    source_tasks,
                    dest_tasks,
                    moved,
                } = reorder_tasks_between_lanes(&self.lanes, &result);
                let updates: Vec<OrderUpdate> = source_tasks
                    .iter()
                    .chain(dest_tasks.iter())
                    .map(|t| OrderUpdate {
                        id: t.id,
                        order: t.order,
                    })
                    .collect();
                for lane in self.lanes.iter_mut() {
                    if lane.lane.id == result.source.droppable_id {
                        lane.tasks = source_tasks.clone();
                    } else if lane.lane.id == dest.droppable_id {
                        lane.tasks = dest_tasks.clone();
                    }
                }
                self.store
                    .update_task_order_different_lane(
                        self.board_id,
                        moved.id,
                        dest.droppable_id,
                        updates,
                    )
                    .await
            }
        };

        match persisted {
            Ok(()) => {
                self.notifier.publish(BoardSignal::Refresh {
                    board_id: self.board_id,
                    user_id: self.user_id,
                });
                Ok(DragOutcome::Persisted)
            }
            Err(e) => {
                self.lanes = snapshot;
                Err(DragError::PersistFailed(e))
            }
        }
    }
}
