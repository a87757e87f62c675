//! Catalog records that entities hang off: areas, projects and the
//! task definitions placeholder queues point at.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::entity::Parent;
use super::ids::{AreaId, ProjectId, TaskDefId, UserId};
use super::queue::{EvaluationMethod, hhmm};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: AreaId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub xp: i64,
}

impl Area {
    pub fn new(id: AreaId, user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            name: name.into(),
            description: None,
            xp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub area_id: AreaId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Project {
    pub fn new(id: ProjectId, area_id: AreaId, name: impl Into<String>) -> Self {
        Self {
            id,
            area_id,
            name: name.into(),
            description: None,
        }
    }
}

/// A sub-task stored on its own and referenced from placeholder queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskDefId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub evaluation_method: EvaluationMethod,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default, with = "hhmm")]
    pub execution_time: Option<NaiveTime>,
    /// Minutes.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub parent: Parent,
}

impl TaskDefinition {
    pub fn yes_no(id: TaskDefId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            evaluation_method: EvaluationMethod::YesNo,
            target_value: None,
            execution_time: None,
            duration: None,
            parent: Parent::None,
        }
    }
}
