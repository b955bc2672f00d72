use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// Token type reported alongside issued tokens.
pub const BEARER_TOKEN_TYPE: &str = "Bearer";

fn bearer() -> String {
    BEARER_TOKEN_TYPE.to_string()
}

/// Request to exchange credentials for a token pair.
#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Successful sign-in response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignInResponse {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
}

/// Request to register a new standard account.
///
/// Also used by the admin bootstrap endpoint.
#[derive(Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Response after registering an account.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub message: String,
}

/// Request to mint a new access token from a refresh token.
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

impl fmt::Debug for RefreshTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshTokenRequest { refresh_token: [REDACTED] }")
    }
}

/// Response carrying a refreshed access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
}

/// Response after creating an admin account.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
}

/// Profile of the calling user.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// A learning subject in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: u64,
    pub title: String,
    pub description: String,
}

/// Request to add a subject to the catalog.
#[derive(Debug, Deserialize)]
pub struct CreateSubjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Request to mark a section as cleared.
#[derive(Debug, Deserialize)]
pub struct MarkSectionClearedRequest {
    pub section_id: u32,
}

/// Response after marking a section as cleared.
#[derive(Debug, Serialize, Deserialize)]
pub struct SectionClearedResponse {
    pub subject_id: u64,
    pub section_id: u32,
    pub completed_at: DateTime<Utc>,
}

/// Cleared sections of one subject for the calling user.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectProgressResponse {
    pub subject_id: u64,
    pub cleared_sections: Vec<u32>,
}

/// Whether a single section is cleared.
#[derive(Debug, Serialize, Deserialize)]
pub struct SectionStatusResponse {
    pub is_cleared: bool,
}
