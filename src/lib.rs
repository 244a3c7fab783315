//! Laneboard: collaborative Kanban board service.
//!
//! ## Overview
//!
//! Workspaces own boards, boards own ordered lanes, lanes own ordered
//! tasks. Collaborators mutate a shared SQLite store over HTTP; after any
//! mutation a refresh signal fans out over WebSocket to every other client
//! viewing the same board, so their views converge without polling.
//!
//! The interesting part is the reorder protocol. A drag gesture is resolved
//! in three stages:
//!
//! 1. [`reorder`]: pure functions compute the new lane/task lists from a
//!    [`reorder::DropResult`], restamping each element's `order` with its
//!    new array index.
//! 2. [`board_view`]: the optimistic controller applies that result to the
//!    client-side cache synchronously, then issues exactly one persistence
//!    call; on failure it restores the pre-drag snapshot.
//! 3. [`db`]: the reconciler applies the order batch as a single
//!    transaction, so concurrent deletes can never leave a half-applied
//!    order. Peer clients then receive a [`notify::BoardSignal`] and
//!    refetch.
//!
//! ## Module Map
//!
//! | Module       | Responsibility                                         |
//! |--------------|--------------------------------------------------------|
//! | `models`     | Domain types: `Board`, `Lane`, `Task`, `BoardRole`     |
//! | `reorder`    | Pure drag-end order computation                        |
//! | `board_view` | Optimistic mutation controller (`BoardView`)           |
//! | `db`         | SQLite access via `DbHandle`, atomic order batches     |
//! | `notify`     | `BoardSignal` + `Notifier` transport seam              |
//! | `ws`         | WebSocket fan-out with board scoping and keepalive     |
//! | `api`        | Route handlers, role gating, `AppState`                |
//! | `server`     | axum Router assembly, `ServerConfig`, startup          |
//! | `errors`     | `StoreError` / `DragError` hierarchies                 |

pub mod api;
pub mod board_view;
pub mod db;
pub mod errors;
pub mod models;
pub mod notify;
pub mod reorder;
pub mod server;
pub mod ws;
