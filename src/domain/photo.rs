use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub user: String,
    pub name: String,
    pub source_hash: Option<String>,
    pub mimetype: Option<String>,
    pub size: Option<u64>,
    pub added: Option<i64>,
}
