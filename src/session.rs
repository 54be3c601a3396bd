//! Session keys shared between the auth handlers and the page gates.

pub const USER_ID: &str = "user_id";
pub const IS_GUEST: &str = "is_guest";
