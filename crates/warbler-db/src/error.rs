use rusqlite::ffi;
use thiserror::Error;

/// Constraint failures the schema can raise, recovered from SQLite's error
/// codes so callers can react without matching on message text.
///
/// Carried inside `anyhow::Error`; use `err.downcast_ref::<ConstraintViolation>()`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("username is already taken")]
    DuplicateUsername,
    #[error("row already exists")]
    Duplicate,
    #[error("users cannot follow themselves")]
    SelfFollow,
    #[error("message text is longer than {} characters", warbler_types::MAX_MESSAGE_LEN)]
    MessageTooLong,
    #[error("referenced user or message does not exist")]
    MissingReference,
}

impl ConstraintViolation {
    fn from_sqlite(err: &ffi::Error, msg: Option<&str>) -> Option<Self> {
        let msg = msg.unwrap_or_default();
        match err.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => Some(if msg.ends_with("users.email") {
                Self::DuplicateEmail
            } else if msg.ends_with("users.username") {
                Self::DuplicateUsername
            } else {
                Self::Duplicate
            }),
            ffi::SQLITE_CONSTRAINT_CHECK if msg.ends_with("no_self_follow") => {
                Some(Self::SelfFollow)
            }
            ffi::SQLITE_CONSTRAINT_CHECK if msg.ends_with("message_length") => {
                Some(Self::MessageTooLong)
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Self::MissingReference),
            _ => None,
        }
    }
}

/// Maps a rusqlite error into `anyhow`, tagging recognised constraint failures.
pub(crate) fn classify(err: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(ref code, ref msg) = err {
        if let Some(violation) = ConstraintViolation::from_sqlite(code, msg.as_deref()) {
            return violation.into();
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(extended_code: i32, msg: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(extended_code), Some(msg.to_string()))
    }

    fn violation(err: rusqlite::Error) -> Option<ConstraintViolation> {
        classify(err).downcast_ref::<ConstraintViolation>().copied()
    }

    #[test]
    fn classifies_unique_columns() {
        assert_eq!(
            violation(failure(ffi::SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed: users.email")),
            Some(ConstraintViolation::DuplicateEmail)
        );
        assert_eq!(
            violation(failure(ffi::SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed: users.username")),
            Some(ConstraintViolation::DuplicateUsername)
        );
    }

    #[test]
    fn too_long_message_names_limit() {
        assert_eq!(
            ConstraintViolation::MessageTooLong.to_string(),
            "message text is longer than 140 characters"
        );
    }

    #[test]
    fn unrelated_errors_pass_through() {
        assert_eq!(violation(rusqlite::Error::QueryReturnedNoRows), None);
        assert_eq!(
            violation(failure(ffi::SQLITE_CONSTRAINT_NOTNULL, "NOT NULL constraint failed: users.email")),
            None
        );
    }
}
