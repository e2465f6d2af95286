use std::str::FromStr;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;
pub const CONTACT_SEARCH_LIMIT: i64 = 100;

/// Clamp a caller supplied row limit into `1..=MAX_LIMIT`.
/// Non-positive values fall back to [`DEFAULT_LIMIT`].
pub fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatSort {
    /// Most recent message first, ties by JID.
    #[default]
    LastActive,
    /// Display name, ties by JID.
    Name,
}

impl FromStr for ChatSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_active" => Ok(ChatSort::LastActive),
            "name" => Ok(ChatSort::Name),
            other => Err(format!("unknown chat sort: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListChatsOpts {
    pub limit: i64,
    pub include_last_message: bool,
    pub sort_by: ChatSort,
}

impl Default for ListChatsOpts {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            include_last_message: true,
            sort_by: ChatSort::LastActive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListMessagesOpts {
    pub chat_jid: String,
    pub limit: i64,
    /// Annotate each message with the resolved chat and sender names.
    pub include_context: bool,
}

impl ListMessagesOpts {
    pub fn new(chat_jid: impl Into<String>) -> Self {
        Self {
            chat_jid: chat_jid.into(),
            limit: DEFAULT_LIMIT,
            include_context: false,
        }
    }
}
