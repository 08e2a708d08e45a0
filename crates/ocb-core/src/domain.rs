use std::fmt;

/// Cursor key of one bot backend (one row in the cursor table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BotId(pub i64);

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access level a user has to a changed parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

impl Access {
    /// Parse the upstream `"rw"` / `"ro"` tags. Anything else is ignored by callers.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "rw" => Some(Access::ReadWrite),
            "ro" => Some(Access::ReadOnly),
            _ => None,
        }
    }
}

/// Kind of change a notification describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Modify,
    Delete,
    Other,
}

impl Action {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "create" => Action::Create,
            "modify" => Action::Modify,
            "delete" => Action::Delete,
            _ => Action::Other,
        }
    }
}

/// One opt-in record: the messenger identity and whether it asked for
/// parameters it can edit (`true`) or everything it can view (`false`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub user: String,
    pub can_edit: bool,
}
