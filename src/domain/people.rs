use serde::{Deserialize, Serialize};

/// A named identity owned by a single user. `auto_created` marks people the
/// recognition pipeline invented ("Unknown Person N") that the user has not
/// yet confirmed or renamed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub user: String,
    pub name: String,
    pub auto_created: bool,
    pub added: Option<i64>,
    pub modified: Option<i64>,
}
