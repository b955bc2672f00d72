use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    AdminUserResponse, BEARER_TOKEN_TYPE, Credential, PasswordHash, Principal,
    RefreshTokenResponse, Role, SignInRequest, SignInResponse, SignUpRequest, SignUpResponse,
    UserResponse,
};
use crate::security::{PasswordHasher, TokenService};
use crate::store::CredentialStore;
use crate::validation::{validate_email, validate_password, validate_username};

/// Sign-in, registration and token refresh on top of the identity store.
///
/// # Timing
///
/// `sign_in` runs exactly one slow hash verification per call: against the
/// stored hash when the identity exists, against the decoy otherwise. Both
/// outcomes map to the same `AppError::InvalidCredentials`.
///
/// Hashing is CPU-bound and runs on the blocking pool so it never stalls
/// the async workers.
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    hasher: Arc<PasswordHasher>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        tokens: TokenService,
    ) -> Self {
        Self {
            credentials,
            hasher: Arc::new(hasher),
            tokens,
        }
    }

    /// Exchange email and password for a token pair.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, request: SignInRequest) -> AppResult<SignInResponse> {
        // Malformed identities take the decoy path like unknown ones
        let credential = validate_email(&request.email)
            .ok()
            .and_then(|()| self.credentials.find_by_identity(&request.email));

        let hasher = self.hasher.clone();
        let (credential, matched) = tokio::task::spawn_blocking(move || {
            let matched = match &credential {
                Some(c) => hasher.verify(&request.password, &c.password_hash),
                None => hasher.verify_decoy(&request.password),
            };
            (credential, matched)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))?;

        let credential = match credential {
            Some(c) if matched => c,
            _ => {
                metrics::record_sign_in(false);
                warn!("Sign-in rejected");
                return Err(AppError::InvalidCredentials);
            }
        };

        let pair = self.tokens.issue_pair(credential.principal())?;
        metrics::record_sign_in(true);
        info!(user_id = %credential.subject_id, "User signed in");

        Ok(SignInResponse {
            user_id: credential.subject_id,
            email: credential.identity,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: BEARER_TOKEN_TYPE.to_string(),
        })
    }

    /// Register a standard account.
    #[instrument(skip_all, fields(username = %request.username))]
    pub async fn sign_up(&self, request: SignUpRequest) -> AppResult<SignUpResponse> {
        let credential = self.register(request, Role::Standard).await?;
        info!(user_id = %credential.subject_id, "User registered");

        Ok(SignUpResponse {
            user_id: credential.subject_id,
            email: credential.identity,
            username: credential.username,
            message: "User registered successfully".to_string(),
        })
    }

    /// Register an admin account. The caller must already have passed the
    /// admin key guard.
    #[instrument(skip_all, fields(username = %request.username))]
    pub async fn create_admin(&self, request: SignUpRequest) -> AppResult<AdminUserResponse> {
        let credential = self.register(request, Role::Admin).await?;
        info!(user_id = %credential.subject_id, "Admin account created");

        Ok(AdminUserResponse {
            user_id: credential.subject_id,
            email: credential.identity,
            username: credential.username,
            role: credential.role,
        })
    }

    /// Mint a new access token from a valid refresh token.
    ///
    /// The role is re-read from the store, so a demoted or deleted account
    /// cannot keep minting tokens with its old role.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<RefreshTokenResponse> {
        let principal = self.tokens.authenticate(refresh_token).map_err(|reason| {
            AppError::Unauthorized(format!("Refresh token rejected: {reason}"))
        })?;

        let credential = self
            .credentials
            .find_by_subject(principal.subject_id)
            .ok_or_else(|| AppError::Unauthorized("Refresh token subject no longer exists".to_string()))?;

        let access_token = self
            .tokens
            .issue_access_token(credential.subject_id, credential.role)?;

        Ok(RefreshTokenResponse {
            access_token,
            token_type: BEARER_TOKEN_TYPE.to_string(),
        })
    }

    /// Profile of an authenticated caller.
    pub fn current_user(&self, principal: Principal) -> AppResult<UserResponse> {
        let credential = self
            .credentials
            .find_by_subject(principal.subject_id)
            .ok_or_else(|| AppError::Unauthorized("Token subject no longer exists".to_string()))?;

        Ok(UserResponse {
            user_id: credential.subject_id,
            email: credential.identity,
            username: credential.username,
            role: credential.role,
        })
    }

    async fn register(&self, request: SignUpRequest, role: Role) -> AppResult<Credential> {
        validate_email(&request.email)?;
        validate_username(&request.username)?;
        validate_password(&request.password)?;

        if self.credentials.identity_exists(&request.email) {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        if self.credentials.username_exists(&request.username) {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }

        let password_hash = self.hash_password(request.password).await?;
        let credential = Credential {
            subject_id: Uuid::new_v4(),
            identity: request.email,
            username: request.username,
            password_hash,
            role,
        };

        // The store re-checks uniqueness atomically
        self.credentials.insert(credential.clone())?;
        Ok(credential)
    }

    async fn hash_password(&self, password: String) -> AppResult<PasswordHash> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
    }
}
