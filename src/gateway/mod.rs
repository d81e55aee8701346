//! Storage for finished drawings and the accounts that own them.
//!
//! The UI and the session only ever see [`DrawingGateway`], so backends can be
//! swapped (and mocked in tests) without touching either.

mod local;
#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DrawColor, StrokeWidth};

pub use local::LocalGateway;

/// Firebase's rule, kept so switching backends does not change what users may pick.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("user not authenticated")]
    NotAuthenticated,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("an account for {0} already exists")]
    AccountExists(String),
    #[error("drawing {0} not found")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error("failed to encode drawing: {0}")]
    Encode(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt metadata: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub uid: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawingRecord {
    pub id: String,
    pub owner_id: String,
    pub image_url: String,
    pub color: DrawColor,
    pub stroke_width: StrokeWidth,
    pub created_at: DateTime<Utc>,
}

/// A rendered drawing ready to be stored.
#[derive(Clone, Debug)]
pub struct DrawingImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Every call may block on IO; callers keep them off the UI thread.
pub trait DrawingGateway: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> GatewayResult<UserAccount>;
    fn sign_up(&self, email: &str, password: &str) -> GatewayResult<UserAccount>;
    fn sign_out(&self);
    fn current_user(&self) -> Option<UserAccount>;

    /// Stores the image and its metadata for the signed-in user, returning the new id.
    fn save(
        &self,
        image: &DrawingImage,
        color: DrawColor,
        stroke_width: StrokeWidth,
    ) -> GatewayResult<String>;

    /// Drawings owned by `owner`, newest first.
    fn list(&self, owner: &str) -> GatewayResult<Vec<DrawingRecord>>;

    fn delete(&self, id: &str) -> GatewayResult<()>;
}

pub(crate) fn validate_credentials(email: &str, password: &str) -> GatewayResult<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') || password.chars().count() < MIN_PASSWORD_LEN {
        return Err(GatewayError::InvalidCredentials);
    }
    Ok(())
}

pub(crate) fn sort_newest_first(records: &mut [DrawingRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
