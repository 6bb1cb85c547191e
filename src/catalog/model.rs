use serde::{Deserialize, Serialize};

/// Snapshot of a user as recorded on catalog items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
}

impl UserInfo {
    pub fn new(name: impl Into<String>, user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// Ownership and timing attached to expressions and modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub shared: bool,
    pub creator: UserInfo,
    pub created_unix_time_sec: i64,
    pub modified_unix_time_sec: i64,
}

/// Decode a JSON text column into its list/object form.
pub(crate) fn decode_json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Like `decode_json_column` for nullable columns.
pub(crate) fn decode_optional_json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<T>> {
    raw.map(|r| decode_json_column(idx, &r)).transpose()
}
