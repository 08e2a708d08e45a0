//! Wire model of the upstream bot API.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use crate::domain::Action;

/// Value of `notification` that asks for the parameter value to be shown.
pub const MODE_WITH_VALUE: &str = "with-value";

/// One config-change event.
///
/// `value` keeps `null` (`None`) apart from the empty string (`Some("")`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub path: String,
    #[serde(default)]
    pub version: i64,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub mtime: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub action: String,
    #[serde(rename = "notification", default)]
    pub notification_mode: String,
    /// Source-system identity -> `"rw"` / `"ro"`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: HashMap<String, String>,
}

impl Notification {
    pub fn action(&self) -> Action {
        Action::parse(&self.action)
    }

    pub fn with_value(&self) -> bool {
        self.notification_mode == MODE_WITH_VALUE
    }
}

/// Response body of `GET /botapi/notification/`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct NotificationBatch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub notifications: Vec<Notification>,
    /// The server's frontier. May exceed the last notification id when the
    /// server filtered some notifications out.
    #[serde(rename = "lastID")]
    pub last_id: i64,
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}
