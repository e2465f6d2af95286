//! Helpers for WhatsApp JIDs.

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";

pub fn is_group(jid: &str) -> bool {
    jid.rsplit_once('@')
        .is_some_and(|(_, server)| server == GROUP_SERVER)
}

/// Turn whatever the caller typed as a recipient into a JID.
///
/// - Anything containing `@` is taken as a JID already.
/// - A phone number ("+55 11 99999-9999") becomes "5511999999999@s.whatsapp.net".
/// - Returns `None` when nothing usable is left.
pub fn normalize_recipient(recipient: &str) -> Option<String> {
    let trimmed = recipient.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some((user, server)) = trimmed.split_once('@') {
        if user.is_empty() || server.is_empty() {
            return None;
        }
        return Some(trimmed.to_string());
    }

    let mut digits = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if i == 0 => {}
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return None,
        }
    }

    if digits.is_empty() {
        return None;
    }

    Some(format!("{}@{}", digits, USER_SERVER))
}
