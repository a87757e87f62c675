//! Domain identifiers (strongly-typed IDs).
//!
//! すべての ID は ULID ベースの `Id<T>` で表現します。
//! `T` は PhantomData のマーカー型で、実行時にはメモリを消費しませんが、
//! `OccurrenceId` と `EntityId` のような取り違えをコンパイル時に防ぎます。
//!
//! ULID は時刻でソート可能なので、同じミリ秒内でなければ生成順に並びます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"user-", "occ-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// Serialize は ULID 文字列そのもの（プレフィックスなし）になります。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the system clock. Prefer `IdGenerator` inside the app layer.
    pub fn random() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the bare ULID and the prefixed display form.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($(#[$doc:meta])* $marker:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(
    /// User のマーカー型
    User,
    "user-"
);
id_marker!(
    /// Area のマーカー型
    Area,
    "area-"
);
id_marker!(
    /// Project のマーカー型
    Project,
    "project-"
);
id_marker!(
    /// 繰り返しエンティティ（routine / placeholder task）のマーカー型
    Entity,
    "entity-"
);
id_marker!(
    /// placeholder から参照されるサブタスク定義のマーカー型
    TaskDef,
    "taskdef-"
);
id_marker!(
    /// Occurrence のマーカー型
    Occurrence,
    "occ-"
);
id_marker!(
    /// OccurrenceItem のマーカー型
    Item,
    "item-"
);

// ========================================
// Type Alias
// ========================================

pub type UserId = Id<User>;
pub type AreaId = Id<Area>;
pub type ProjectId = Id<Project>;

/// Identifier of a recurring entity (routine or placeholder task).
pub type EntityId = Id<Entity>;

/// Identifier of an independently stored sub-task definition.
pub type TaskDefId = Id<TaskDef>;

/// Identifier of one dated materialization of an entity.
pub type OccurrenceId = Id<Occurrence>;

/// Identifier of a generated item inside an occurrence.
pub type ItemId = Id<Item>;
