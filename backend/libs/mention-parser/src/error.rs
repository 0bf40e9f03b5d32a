//! Mention error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MentionError {
    #[error("Mention pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Profile lookup failed: {0}")]
    Lookup(String),
}

pub type MentionResult<T> = Result<T, MentionError>;
