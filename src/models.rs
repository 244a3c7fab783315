use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Role of a user on a single board. Ordered from most to least privileged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BoardRole {
    Creator,
    Admin,
    Editor,
    Viewer,
}

impl BoardRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    /// Whether this role may mutate board content (lanes, tasks, order).
    pub fn can_edit(&self) -> bool {
        !matches!(self, Self::Viewer)
    }

    /// Whether this role may manage the board itself (delete, memberships).
    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Creator | Self::Admin)
    }
}

impl FromStr for BoardRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creator" => Ok(Self::Creator),
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(format!("Invalid board role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub is_public: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCategory {
    pub id: i64,
    pub board_id: i64,
    pub name: String,
    pub color: String,
}

/// A column within a board. `order` is the zero-based position among the
/// board's lanes; after a reorder settles, sibling orders form a contiguous
/// permutation of `0..N`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lane {
    pub id: i64,
    pub board_id: i64,
    pub name: String,
    pub order: i64,
    pub created_at: String,
}

/// A card within a lane. `order` is the zero-based position within the
/// owning lane. A task belongs to exactly one lane at any instant; moving it
/// across lanes re-points `lane_id` and reorders both lanes atomically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub lane_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub order: i64,
    pub created_at: String,
    /// User ids assigned to this task. Populated by the full board read.
    #[serde(default)]
    pub assignees: Vec<i64>,
    /// Comments in creation order. Populated by the full board read.
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub body: String,
    pub created_at: String,
}

/// A lane together with its ordered tasks: the unit the client-side cache
/// and the reorder engine operate on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaneWithTasks {
    #[serde(flatten)]
    pub lane: Lane,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardMember {
    pub user: User,
    pub role: BoardRole,
}

/// Everything a board view needs, shaped the way clients consume it: lanes
/// sorted by order, each lane's tasks sorted by order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullBoard {
    #[serde(flatten)]
    pub board: Board,
    pub categories: Vec<TaskCategory>,
    pub members: Vec<BoardMember>,
    pub lanes: Vec<LaneWithTasks>,
}

/// One `{id, order}` pair of a reorder batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrderUpdate {
    pub id: i64,
    pub order: i64,
}
