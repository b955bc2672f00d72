mod api;
mod identity;

pub use api::{
    AdminUserResponse, BEARER_TOKEN_TYPE, CreateSubjectRequest, HealthResponse,
    MarkSectionClearedRequest, RefreshTokenRequest, RefreshTokenResponse, SectionClearedResponse,
    SectionStatusResponse, SignInRequest, SignInResponse, SignUpRequest, SignUpResponse, Subject,
    SubjectProgressResponse, UserResponse,
};
pub use identity::{Credential, MAX_PASSWORD_HASH_LENGTH, PasswordHash, Principal, Role};
