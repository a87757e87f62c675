//! Rotating queue model: iterations of task / sub-task / cooldown items.
//!
//! Queues are stored as JSON documents. They are converted into the closed
//! types below once, at the persistence boundary (`Queue::from_json`), so
//! the generator never inspects raw JSON.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::TaskDefId;

/// How a task's completion is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationMethod {
    YesNo,
    Numeric,
}

/// Only sequential rotation exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationType {
    #[default]
    Sequential,
}

/// Full task data embedded in a routine queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Client-assigned id of the item inside the queue document.
    pub id: String,
    pub name: String,
    pub evaluation_method: EvaluationMethod,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default, with = "hhmm")]
    pub execution_time: Option<NaiveTime>,
    /// Minutes.
    #[serde(default)]
    pub duration: Option<u32>,
}

/// Reference to a stored `TaskDefinition` (placeholder queues).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskRef {
    pub sub_task_id: TaskDefId,
    #[serde(default, with = "hhmm")]
    pub execution_time: Option<NaiveTime>,
}

/// Rest marker. Produces nothing when materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cooldown {
    /// Free-form span such as `"1d"` or `"2h"`.
    pub duration: String,
    #[serde(default)]
    pub description: String,
}

/// One entry of an iteration, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueItem {
    Task(TaskItem),
    SubTask(SubTaskRef),
    Cooldown(Cooldown),
}

impl QueueItem {
    pub fn is_cooldown(&self) -> bool {
        matches!(self, QueueItem::Cooldown(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub position: u32,
    /// Whole-iteration rest day: no items are materialized.
    #[serde(default, rename = "isCooldown")]
    pub is_cooldown: bool,
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

impl Iteration {
    /// Items that turn into occurrence items, in queue order.
    pub fn actionable_items(&self) -> impl Iterator<Item = &QueueItem> {
        let skip_all = self.is_cooldown;
        self.items
            .iter()
            .filter(move |item| !skip_all && !item.is_cooldown())
    }
}

/// Ordered, cyclic list of iterations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Queue {
    #[serde(default)]
    pub iterations: Vec<Iteration>,
    #[serde(default)]
    pub rotation_type: RotationType,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("queue document is not an object with an `iterations` array: {0}")]
    Shape(String),

    #[error("iteration {iteration} is malformed: {reason}")]
    MalformedIteration { iteration: usize, reason: String },

    #[error("item {index} of iteration {iteration} is malformed: {reason}")]
    MalformedItem {
        iteration: usize,
        index: usize,
        reason: String,
    },
}

impl Queue {
    pub fn new(iterations: Vec<Iteration>) -> Self {
        Self {
            iterations,
            rotation_type: RotationType::Sequential,
        }
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Iteration for a stored position. Positions wrap modulo the iteration count.
    pub fn iteration_at(&self, position: u32) -> Option<&Iteration> {
        if self.iterations.is_empty() {
            return None;
        }
        self.iterations.get(position as usize % self.iterations.len())
    }

    /// Parse and validate a stored queue document.
    ///
    /// Items are decoded one by one so that the error points at the offending
    /// iteration/item. Iterations are ordered by their `position` (stable).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, QueueError> {
        let object = value
            .as_object()
            .ok_or_else(|| QueueError::Shape(format!("expected object, got {value}")))?;

        let rotation_type = match object.get("rotation_type") {
            None | Some(serde_json::Value::Null) => RotationType::Sequential,
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| QueueError::Shape(format!("rotation_type: {e}")))?,
        };

        let raw_iterations = match object.get("iterations") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(list)) => list.clone(),
            Some(other) => {
                return Err(QueueError::Shape(format!(
                    "`iterations` must be an array, got {other}"
                )));
            }
        };

        let mut iterations = Vec::with_capacity(raw_iterations.len());
        for (i, raw) in raw_iterations.iter().enumerate() {
            iterations.push(parse_iteration(i, raw)?);
        }
        iterations.sort_by_key(|it| it.position);

        let queue = Self {
            iterations,
            rotation_type,
        };
        queue.validate()?;
        Ok(queue)
    }

    /// Checks the per-type required fields serde cannot express.
    pub fn validate(&self) -> Result<(), QueueError> {
        for (i, iteration) in self.iterations.iter().enumerate() {
            for (j, item) in iteration.items.iter().enumerate() {
                let malformed = |reason: &str| QueueError::MalformedItem {
                    iteration: i,
                    index: j,
                    reason: reason.to_string(),
                };
                match item {
                    QueueItem::Task(task) => {
                        if task.name.trim().is_empty() {
                            return Err(malformed("TASK item has an empty name"));
                        }
                        if task.evaluation_method == EvaluationMethod::Numeric
                            && task.target_value.is_none()
                        {
                            return Err(malformed("NUMERIC TASK item requires target_value"));
                        }
                    }
                    QueueItem::Cooldown(cooldown) => {
                        if cooldown.duration.trim().is_empty() {
                            return Err(malformed("COOLDOWN item requires a duration"));
                        }
                    }
                    QueueItem::SubTask(_) => {}
                }
            }
        }
        Ok(())
    }
}

fn parse_iteration(index: usize, raw: &serde_json::Value) -> Result<Iteration, QueueError> {
    let object = raw.as_object().ok_or_else(|| QueueError::MalformedIteration {
        iteration: index,
        reason: "expected object".to_string(),
    })?;

    let position = match object.get("position") {
        None | Some(serde_json::Value::Null) => index as u32,
        Some(p) => p
            .as_u64()
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(|| QueueError::MalformedIteration {
                iteration: index,
                reason: format!("position must be a non-negative integer, got {p}"),
            })?,
    };

    let is_cooldown = object
        .get("isCooldown")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let raw_items = match object.get("items") {
        None | Some(serde_json::Value::Null) => &[][..],
        Some(serde_json::Value::Array(list)) => list.as_slice(),
        Some(_) => {
            return Err(QueueError::MalformedIteration {
                iteration: index,
                reason: "`items` must be an array".to_string(),
            });
        }
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for (j, raw_item) in raw_items.iter().enumerate() {
        let item: QueueItem =
            serde_json::from_value(raw_item.clone()).map_err(|e| QueueError::MalformedItem {
                iteration: index,
                index: j,
                reason: e.to_string(),
            })?;
        items.push(item);
    }

    Ok(Iteration {
        position,
        is_cooldown,
        items,
    })
}

/// `"HH:MM"` wall-clock times.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format(FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveTime::parse_from_str(s, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
