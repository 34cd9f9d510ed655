pub mod models;

/// Avatar assigned to users who register without one.
pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.png";

/// Longest message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 140;
