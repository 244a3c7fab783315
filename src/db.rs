//! SQLite persistence for boards, lanes and tasks.
//!
//! `BoardDb` is the synchronous store; `DbHandle` wraps it behind
//! `Arc<Mutex>` and runs all access on tokio's blocking thread pool via
//! `spawn_blocking`, so synchronous SQLite I/O never ties up async worker
//! threads.
//!
//! This module is the only writer of lane/task `order` values. The three
//! order-batch operations each run inside a single transaction: a partial
//! failure (including a row deleted by a concurrent user) rolls the whole
//! batch back, so siblings never end up with a half-applied order. No
//! version check is performed across batches; two concurrent reorders race
//! and the later commit wins outright.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::errors::StoreError;
use crate::models::*;

type Result<T> = std::result::Result<T, StoreError>;

/// Async-safe handle to the board database.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| StoreError::Internal(format!("DB lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("DB task panicked: {}", e)))?
    }

    /// Acquire the database mutex synchronously. For startup initialization
    /// and tests; must not be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Internal(format!("DB lock poisoned: {}", e)))
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS workspaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS boards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS board_members (
                board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role TEXT NOT NULL DEFAULT 'editor',
                PRIMARY KEY (board_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS task_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS lanes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                ord INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lane_id INTEGER NOT NULL REFERENCES lanes(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT,
                due_date TEXT,
                category_id INTEGER REFERENCES task_categories(id) ON DELETE SET NULL,
                ord INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS task_assignees (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (task_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS task_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id),
                body TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_lanes_board ON lanes(board_id, ord);
            CREATE INDEX IF NOT EXISTS idx_tasks_lane ON tasks(lane_id, ord);
            CREATE INDEX IF NOT EXISTS idx_comments_task ON task_comments(task_id);
            ",
        )?;
        Ok(())
    }

    // ── Users & workspaces ────────────────────────────────────────────

    pub fn create_user(&self, name: &str) -> Result<User> {
        self.conn
            .execute("INSERT INTO users (name) VALUES (?1)", params![name])?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .ok_or(StoreError::not_found("user", id))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        rows.next().transpose().map_err(StoreError::from)
    }

    pub fn create_workspace(&self, name: &str) -> Result<Workspace> {
        self.conn
            .execute("INSERT INTO workspaces (name) VALUES (?1)", params![name])?;
        let id = self.conn.last_insert_rowid();
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM workspaces WHERE id = ?1")?;
        let ws = stmt.query_row(params![id], |row| {
            Ok(Workspace {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(ws)
    }

    // ── Boards & membership ───────────────────────────────────────────

    /// Create a board in a workspace; the creator gets the `Creator` role.
    pub fn create_board(
        &self,
        workspace_id: i64,
        name: &str,
        is_public: bool,
        creator_id: i64,
    ) -> Result<Board> {
        let ws_exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM workspaces WHERE id = ?1",
            params![workspace_id],
            |row| row.get(0),
        )?;
        if !ws_exists {
            return Err(StoreError::not_found("workspace", workspace_id));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO boards (workspace_id, name, is_public) VALUES (?1, ?2, ?3)",
            params![workspace_id, name, is_public],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO board_members (board_id, user_id, role) VALUES (?1, ?2, ?3)",
            params![id, creator_id, BoardRole::Creator.as_str()],
        )?;
        tx.commit()?;
        self.get_board(id)?
            .ok_or(StoreError::not_found("board", id))
    }

    pub fn get_board(&self, id: i64) -> Result<Option<Board>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, workspace_id, name, is_public, created_at FROM boards WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(Board {
                id: row.get(0)?,
                workspace_id: row.get(1)?,
                name: row.get(2)?,
                is_public: row.get::<_, i64>(3)? != 0,
                created_at: row.get(4)?,
            })
        })?;
        rows.next().transpose().map_err(StoreError::from)
    }

    pub fn delete_board(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM boards WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Insert or update a user's role on a board.
    pub fn upsert_member(&self, board_id: i64, user_id: i64, role: BoardRole) -> Result<()> {
        if self.get_board(board_id)?.is_none() {
            return Err(StoreError::not_found("board", board_id));
        }
        if self.get_user(user_id)?.is_none() {
            return Err(StoreError::not_found("user", user_id));
        }
        self.conn.execute(
            "INSERT INTO board_members (board_id, user_id, role) VALUES (?1, ?2, ?3)
             ON CONFLICT (board_id, user_id) DO UPDATE SET role = excluded.role",
            params![board_id, user_id, role.as_str()],
        )?;
        Ok(())
    }

    pub fn member_role(&self, board_id: i64, user_id: i64) -> Result<Option<BoardRole>> {
        let mut stmt = self
            .conn
            .prepare("SELECT role FROM board_members WHERE board_id = ?1 AND user_id = ?2")?;
        let mut rows = stmt.query_map(params![board_id, user_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => {
                let role = BoardRole::from_str(&row?).map_err(StoreError::Invalid)?;
                Ok(Some(role))
            }
            None => Ok(None),
        }
    }

    /// Gate a board read: members always pass, everyone passes on a public
    /// board. Unauthorized is reported distinctly from not-found.
    pub fn authorize_read(&self, user_id: Option<i64>, board_id: i64) -> Result<Board> {
        let board = self
            .get_board(board_id)?
            .ok_or(StoreError::not_found("board", board_id))?;
        if board.is_public {
            return Ok(board);
        }
        let user_id = user_id.ok_or(StoreError::Unauthorized {
            user_id: 0,
            board_id,
        })?;
        if self.member_role(board_id, user_id)?.is_none() {
            return Err(StoreError::Unauthorized { user_id, board_id });
        }
        Ok(board)
    }

    /// Gate a content mutation: the caller must be a member whose role can
    /// edit. Viewers are rejected with `Forbidden`.
    pub fn authorize_edit(&self, user_id: i64, board_id: i64) -> Result<BoardRole> {
        if self.get_board(board_id)?.is_none() {
            return Err(StoreError::not_found("board", board_id));
        }
        let role = self
            .member_role(board_id, user_id)?
            .ok_or(StoreError::Unauthorized { user_id, board_id })?;
        if !role.can_edit() {
            return Err(StoreError::Forbidden {
                role: role.as_str(),
            });
        }
        Ok(role)
    }

    /// Gate a board-management mutation (delete board, change memberships).
    pub fn authorize_manage(&self, user_id: i64, board_id: i64) -> Result<BoardRole> {
        if self.get_board(board_id)?.is_none() {
            return Err(StoreError::not_found("board", board_id));
        }
        let role = self
            .member_role(board_id, user_id)?
            .ok_or(StoreError::Unauthorized { user_id, board_id })?;
        if !role.can_manage() {
            return Err(StoreError::Forbidden {
                role: role.as_str(),
            });
        }
        Ok(role)
    }

    // ── Categories ────────────────────────────────────────────────────

    pub fn create_category(&self, board_id: i64, name: &str, color: &str) -> Result<TaskCategory> {
        if self.get_board(board_id)?.is_none() {
            return Err(StoreError::not_found("board", board_id));
        }
        self.conn.execute(
            "INSERT INTO task_categories (board_id, name, color) VALUES (?1, ?2, ?3)",
            params![board_id, name, color],
        )?;
        let id = self.conn.last_insert_rowid();
        let mut stmt = self
            .conn
            .prepare("SELECT id, board_id, name, color FROM task_categories WHERE id = ?1")?;
        let category = stmt.query_row(params![id], |row| {
            Ok(TaskCategory {
                id: row.get(0)?,
                board_id: row.get(1)?,
                name: row.get(2)?,
                color: row.get(3)?,
            })
        })?;
        Ok(category)
    }

    pub fn list_categories(&self, board_id: i64) -> Result<Vec<TaskCategory>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, board_id, name, color FROM task_categories WHERE board_id = ?1 ORDER BY id",
        )?;
        let categories = stmt
            .query_map(params![board_id], |row| {
                Ok(TaskCategory {
                    id: row.get(0)?,
                    board_id: row.get(1)?,
                    name: row.get(2)?,
                    color: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(categories)
    }

    // ── Lanes ─────────────────────────────────────────────────────────

    /// Create a lane at the end of the board's lane strip
    /// (`order = current sibling count`).
    pub fn create_lane(&self, board_id: i64, name: &str) -> Result<Lane> {
        if self.get_board(board_id)?.is_none() {
            return Err(StoreError::not_found("board", board_id));
        }
        let tx = self.conn.unchecked_transaction()?;
        let next_ord: i64 = tx.query_row(
            "SELECT COUNT(*) FROM lanes WHERE board_id = ?1",
            params![board_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO lanes (board_id, name, ord) VALUES (?1, ?2, ?3)",
            params![board_id, name, next_ord],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        self.get_lane(id)?.ok_or(StoreError::not_found("lane", id))
    }

    pub fn get_lane(&self, id: i64) -> Result<Option<Lane>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, board_id, name, ord, created_at FROM lanes WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(Lane {
                id: row.get(0)?,
                board_id: row.get(1)?,
                name: row.get(2)?,
                order: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Board owning a lane; used to gate lane mutations addressed by lane id.
    pub fn lane_board(&self, lane_id: i64) -> Result<i64> {
        self.get_lane(lane_id)?
            .map(|lane| lane.board_id)
            .ok_or(StoreError::not_found("lane", lane_id))
    }

    /// Rename only; `order` is never touched by edit paths.
    pub fn rename_lane(&self, id: i64, name: &str) -> Result<Lane> {
        let count = self.conn.execute(
            "UPDATE lanes SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        if count == 0 {
            return Err(StoreError::not_found("lane", id));
        }
        self.get_lane(id)?.ok_or(StoreError::not_found("lane", id))
    }

    /// Delete a lane and (cascading) its tasks. Surviving siblings are not
    /// renumbered; ordered reads stay deterministic via the id tie-break.
    pub fn delete_lane(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM lanes WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    /// Create a task at the end of its lane (`order = current sibling count`).
    pub fn create_task(&self, lane_id: i64, title: &str) -> Result<Task> {
        if self.get_lane(lane_id)?.is_none() {
            return Err(StoreError::not_found("lane", lane_id));
        }
        let tx = self.conn.unchecked_transaction()?;
        let next_ord: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE lane_id = ?1",
            params![lane_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO tasks (lane_id, title, ord) VALUES (?1, ?2, ?3)",
            params![lane_id, title, next_ord],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        self.get_task(id)?.ok_or(StoreError::not_found("task", id))
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, lane_id, title, description, due_date, category_id, ord, created_at
             FROM tasks WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], task_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?.into_task()?)),
            None => Ok(None),
        }
    }

    /// Board owning a task (through its lane); used to gate task mutations.
    pub fn task_board(&self, task_id: i64) -> Result<i64> {
        let mut stmt = self.conn.prepare(
            "SELECT l.board_id FROM tasks t JOIN lanes l ON t.lane_id = l.id WHERE t.id = ?1",
        )?;
        let mut rows = stmt.query_map(params![task_id], |row| row.get::<_, i64>(0))?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(StoreError::not_found("task", task_id)),
        }
    }

    /// Edit task content. `order` and `lane_id` are never touched by this
    /// path. The outer `Option` means "leave unchanged"; the inner one sets
    /// or clears nullable fields.
    pub fn update_task(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<Option<&str>>,
        due_date: Option<Option<DateTime<Utc>>>,
        category_id: Option<Option<i64>>,
    ) -> Result<Task> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(t) = title {
            tx.execute("UPDATE tasks SET title = ?1 WHERE id = ?2", params![t, id])?;
        }
        if let Some(d) = description {
            tx.execute(
                "UPDATE tasks SET description = ?1 WHERE id = ?2",
                params![d, id],
            )?;
        }
        if let Some(due) = due_date {
            tx.execute(
                "UPDATE tasks SET due_date = ?1 WHERE id = ?2",
                params![due.map(|d| d.to_rfc3339()), id],
            )?;
        }
        if let Some(c) = category_id {
            tx.execute(
                "UPDATE tasks SET category_id = ?1 WHERE id = ?2",
                params![c, id],
            )?;
        }
        tx.commit()?;
        self.get_task(id)?.ok_or(StoreError::not_found("task", id))
    }

    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn assign_user(&self, task_id: i64, user_id: i64) -> Result<()> {
        if self.get_task(task_id)?.is_none() {
            return Err(StoreError::not_found("task", task_id));
        }
        if self.get_user(user_id)?.is_none() {
            return Err(StoreError::not_found("user", user_id));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?1, ?2)",
            params![task_id, user_id],
        )?;
        Ok(())
    }

    pub fn unassign_user(&self, task_id: i64, user_id: i64) -> Result<bool> {
        let count = self.conn.execute(
            "DELETE FROM task_assignees WHERE task_id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(count > 0)
    }

    pub fn add_comment(&self, task_id: i64, user_id: i64, body: &str) -> Result<Comment> {
        if self.get_task(task_id)?.is_none() {
            return Err(StoreError::not_found("task", task_id));
        }
        self.conn.execute(
            "INSERT INTO task_comments (task_id, user_id, body) VALUES (?1, ?2, ?3)",
            params![task_id, user_id, body],
        )?;
        let id = self.conn.last_insert_rowid();
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, user_id, body, created_at FROM task_comments WHERE id = ?1",
        )?;
        let comment = stmt.query_row(params![id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                task_id: row.get(1)?,
                user_id: row.get(2)?,
                body: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(comment)
    }

    // ── Ordered reads ─────────────────────────────────────────────────

    /// Lanes of a board with their tasks, both sorted `ord ASC, id ASC`.
    /// The id tie-break is the fixed determinism rule when order values
    /// collide (the schema does not enforce uniqueness).
    pub fn list_lanes(&self, board_id: i64) -> Result<Vec<LaneWithTasks>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, board_id, name, ord, created_at FROM lanes
             WHERE board_id = ?1 ORDER BY ord ASC, id ASC",
        )?;
        let lanes: Vec<Lane> = stmt
            .query_map(params![board_id], |row| {
                Ok(Lane {
                    id: row.get(0)?,
                    board_id: row.get(1)?,
                    name: row.get(2)?,
                    order: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.lane_id, t.title, t.description, t.due_date, t.category_id, t.ord, t.created_at
             FROM tasks t JOIN lanes l ON t.lane_id = l.id
             WHERE l.board_id = ?1 ORDER BY t.ord ASC, t.id ASC",
        )?;
        let task_rows: Vec<TaskRow> = stmt
            .query_map(params![board_id], task_row)?
            .collect::<rusqlite::Result<_>>()?;

        let mut by_lane: HashMap<i64, Vec<Task>> = HashMap::new();
        for row in task_rows {
            let task = row.into_task()?;
            by_lane.entry(task.lane_id).or_default().push(task);
        }

        Ok(lanes
            .into_iter()
            .map(|lane| {
                let tasks = by_lane.remove(&lane.id).unwrap_or_default();
                LaneWithTasks { lane, tasks }
            })
            .collect())
    }

    /// The full board read: board, categories, members, and lanes with
    /// tasks (each task carrying its assignees and comments).
    pub fn get_board_full(&self, board_id: i64) -> Result<FullBoard> {
        let board = self
            .get_board(board_id)?
            .ok_or(StoreError::not_found("board", board_id))?;

        let categories = self.list_categories(board_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.created_at, m.role
             FROM board_members m JOIN users u ON m.user_id = u.id
             WHERE m.board_id = ?1 ORDER BY u.id",
        )?;
        let member_rows: Vec<(User, String)> = stmt
            .query_map(params![board_id], |row| {
                Ok((
                    User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;
        let members = member_rows
            .into_iter()
            .map(|(user, role)| {
                Ok(BoardMember {
                    user,
                    role: BoardRole::from_str(&role).map_err(StoreError::Invalid)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut lanes = self.list_lanes(board_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT a.task_id, a.user_id
             FROM task_assignees a
             JOIN tasks t ON a.task_id = t.id
             JOIN lanes l ON t.lane_id = l.id
             WHERE l.board_id = ?1 ORDER BY a.user_id",
        )?;
        let assignee_rows: Vec<(i64, i64)> = stmt
            .query_map(params![board_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        let mut assignees: HashMap<i64, Vec<i64>> = HashMap::new();
        for (task_id, user_id) in assignee_rows {
            assignees.entry(task_id).or_default().push(user_id);
        }

        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.task_id, c.user_id, c.body, c.created_at
             FROM task_comments c
             JOIN tasks t ON c.task_id = t.id
             JOIN lanes l ON t.lane_id = l.id
             WHERE l.board_id = ?1 ORDER BY c.created_at ASC, c.id ASC",
        )?;
        let comment_rows: Vec<Comment> = stmt
            .query_map(params![board_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    user_id: row.get(2)?,
                    body: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        let mut comments: HashMap<i64, Vec<Comment>> = HashMap::new();
        for comment in comment_rows {
            comments.entry(comment.task_id).or_default().push(comment);
        }

        for lane in &mut lanes {
            for task in &mut lane.tasks {
                task.assignees = assignees.remove(&task.id).unwrap_or_default();
                task.comments = comments.remove(&task.id).unwrap_or_default();
            }
        }

        Ok(FullBoard {
            board,
            categories,
            members,
            lanes,
        })
    }

    // ── Order batches (the Persistence Reconciler) ────────────────────

    /// Apply a batch of lane order updates atomically. Every write is scoped
    /// to `board_id`, so a batch can never touch another board's lanes no
    /// matter which ids it names. A lane id that no longer exists, or belongs
    /// to a different board, fails the whole batch; nothing is applied.
    pub fn update_lane_order(&self, board_id: i64, updates: &[OrderUpdate]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE lanes SET ord = ?1 WHERE id = ?2 AND board_id = ?3")?;
            for update in updates {
                let count = stmt.execute(params![update.order, update.id, board_id])?;
                if count == 0 {
                    return Err(StoreError::not_found("lane", update.id));
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Apply a batch of task order updates atomically (tasks stay in their
    /// lanes). Writes are scoped to `board_id` through the owning lane.
    pub fn update_task_order_same_lane(
        &self,
        board_id: i64,
        updates: &[OrderUpdate],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE tasks SET ord = ?1 WHERE id = ?2
                 AND lane_id IN (SELECT id FROM lanes WHERE board_id = ?3)",
            )?;
            for update in updates {
                let count = stmt.execute(params![update.order, update.id, board_id])?;
                if count == 0 {
                    return Err(StoreError::not_found("task", update.id));
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Re-point the moved task's lane and apply order updates spanning both
    /// the vacated and the destination lane, all in one transaction. The
    /// moved task's own `{id, order}` pair is expected in `updates`. The
    /// destination lane, the moved task and every batched task must all live
    /// on `board_id`; anything else fails the whole batch.
    pub fn update_task_order_different_lane(
        &self,
        board_id: i64,
        moved_task_id: i64,
        new_lane_id: i64,
        updates: &[OrderUpdate],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let lane_exists: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM lanes WHERE id = ?1 AND board_id = ?2",
                params![new_lane_id, board_id],
                |row| row.get(0),
            )?;
            if !lane_exists {
                return Err(StoreError::not_found("lane", new_lane_id));
            }
            let count = tx.execute(
                "UPDATE tasks SET lane_id = ?1 WHERE id = ?2
                 AND lane_id IN (SELECT id FROM lanes WHERE board_id = ?3)",
                params![new_lane_id, moved_task_id, board_id],
            )?;
            if count == 0 {
                return Err(StoreError::not_found("task", moved_task_id));
            }
            let mut stmt = tx.prepare(
                "UPDATE tasks SET ord = ?1 WHERE id = ?2
                 AND lane_id IN (SELECT id FROM lanes WHERE board_id = ?3)",
            )?;
            for update in updates {
                let count = stmt.execute(params![update.order, update.id, board_id])?;
                if count == 0 {
                    return Err(StoreError::not_found("task", update.id));
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// The server-side store is also a valid [`OrderStore`] for the optimistic
/// controller, so in-process clients (and integration tests) can drive
/// `BoardView` against the real database.
#[async_trait::async_trait]
impl crate::board_view::OrderStore for DbHandle {
    async fn update_lane_order(&self, board_id: i64, updates: Vec<OrderUpdate>) -> Result<()> {
        self.call(move |db| db.update_lane_order(board_id, &updates))
            .await
    }

    async fn update_task_order_same_lane(
        &self,
        board_id: i64,
        updates: Vec<OrderUpdate>,
    ) -> Result<()> {
        self.call(move |db| db.update_task_order_same_lane(board_id, &updates))
            .await
    }

    async fn update_task_order_different_lane(
        &self,
        board_id: i64,
        moved_task_id: i64,
        new_lane_id: i64,
        updates: Vec<OrderUpdate>,
    ) -> Result<()> {
        self.call(move |db| {
            db.update_task_order_different_lane(board_id, moved_task_id, new_lane_id, &updates)
        })
        .await
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for reading tasks from SQLite before parsing the
/// due date string into a typed value.
struct TaskRow {
    id: i64,
    lane_id: i64,
    title: String,
    description: Option<String>,
    due_date: Option<String>,
    category_id: Option<i64>,
    ord: i64,
    created_at: String,
}

fn task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        lane_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_date: row.get(4)?,
        category_id: row.get(5)?,
        ord: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let due_date = match self.due_date {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| StoreError::Invalid(format!("invalid due date '{}': {}", s, e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(Task {
            id: self.id,
            lane_id: self.lane_id,
            title: self.title,
            description: self.description,
            due_date,
            category_id: self.category_id,
            order: self.ord,
            created_at: self.created_at,
            assignees: Vec::new(),
            comments: Vec::new(),
        })
    }
}
