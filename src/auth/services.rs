use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{
    dto::{AuthResponse, LoginRequest, SignupRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password, MIN_PASSWORD_LEN},
};
use crate::{
    config::SuperuserSeed,
    error::ApiError,
    store::{NewUser, Repository, User, DUPLICATE_EMAIL},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn check_new_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation("Password too short".into()));
    }
    Ok(())
}

fn issue_tokens(keys: &JwtKeys, user: User) -> Result<AuthResponse, ApiError> {
    let pair = keys.sign_pair(user.id)?;
    Ok(AuthResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        user: user.into(),
    })
}

/// Keeps the revocation list bounded by the refresh token lifetime.
async fn purge_revocations(repo: &dyn Repository) -> Result<(), ApiError> {
    let purged = repo.purge_expired_revocations(OffsetDateTime::now_utc()).await?;
    if purged > 0 {
        debug!(purged, "expired revocations purged");
    }
    Ok(())
}

fn invalid_token() -> ApiError {
    ApiError::InvalidToken("Token is invalid or expired".into())
}

pub async fn signup(
    repo: &dyn Repository,
    keys: &JwtKeys,
    req: SignupRequest,
) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if req.password1 != req.password2 {
        return Err(ApiError::Validation(
            "The two password fields didn't match".into(),
        ));
    }
    check_new_password(&req.password1)?;

    if repo.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Validation(DUPLICATE_EMAIL.into()));
    }

    let password_hash = hash_password(&req.password1)?;
    let user = repo
        .create_user(NewUser {
            email,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            password_hash,
            is_staff: false,
            is_superuser: false,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue_tokens(keys, user)
}

pub async fn login(
    repo: &dyn Repository,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(&req.email);
    let denied = || ApiError::Unauthenticated("Invalid credentials".into());

    let Some(user) = repo.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(denied());
    };
    if !user.is_active {
        warn!(user_id = %user.id, "login on inactive account");
        return Err(denied());
    }
    if !verify_password(&req.password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(denied());
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_tokens(keys, user)
}

/// Exchanges a refresh token for a new pair. The presented token is revoked.
pub async fn refresh(
    repo: &dyn Repository,
    keys: &JwtKeys,
    token: &str,
) -> Result<AuthResponse, ApiError> {
    let claims = keys.verify_refresh(token).map_err(|e| {
        warn!(error = %e, "refresh with bad token");
        invalid_token()
    })?;
    if repo.is_token_revoked(claims.jti).await? {
        warn!(user_id = %claims.sub, "refresh with revoked token");
        return Err(ApiError::InvalidToken("Token is blacklisted".into()));
    }

    let user = match repo.get_user(claims.sub).await? {
        Some(u) if u.is_active => u,
        _ => return Err(ApiError::InvalidToken("User not found".into())),
    };

    purge_revocations(repo).await?;
    let expires_at = expiry(claims.exp)?;
    if !repo.revoke_token(claims.jti, user.id, expires_at).await? {
        return Err(ApiError::InvalidToken("Token is blacklisted".into()));
    }

    issue_tokens(keys, user)
}

/// Moves the actor's refresh token to the revocation list.
pub async fn logout(
    repo: &dyn Repository,
    keys: &JwtKeys,
    actor: &User,
    token: &str,
) -> Result<(), ApiError> {
    let claims = keys.verify_refresh(token).map_err(|e| {
        warn!(error = %e, user_id = %actor.id, "logout with bad token");
        invalid_token()
    })?;
    if claims.sub != actor.id {
        warn!(user_id = %actor.id, token_sub = %claims.sub, "logout with foreign token");
        return Err(invalid_token());
    }

    purge_revocations(repo).await?;
    let expires_at = expiry(claims.exp)?;
    if !repo.revoke_token(claims.jti, actor.id, expires_at).await? {
        return Err(ApiError::InvalidToken("Token is blacklisted".into()));
    }

    info!(user_id = %actor.id, "user logged out");
    Ok(())
}

fn expiry(exp: usize) -> Result<OffsetDateTime, ApiError> {
    OffsetDateTime::from_unix_timestamp(exp as i64)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))
}

/// Creates the configured superuser unless an account with that email exists.
pub async fn ensure_superuser(repo: &dyn Repository, seed: &SuperuserSeed) -> anyhow::Result<()> {
    let email = normalize_email(&seed.email);
    if repo.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }
    let user = repo
        .create_user(NewUser {
            email,
            first_name: String::new(),
            last_name: String::new(),
            password_hash: hash_password(&seed.password)?,
            is_staff: true,
            is_superuser: true,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "superuser created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::LoginRequest;
    use crate::state::AppState;
    use axum::extract::FromRef;

    fn signup_req(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            password1: password.into(),
            password2: password.into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("no at sign"));
    }

    #[tokio::test]
    async fn signup_normalizes_email_and_issues_tokens() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let res = signup(state.repo.as_ref(), &keys, signup_req("  Ada@Example.COM ", "password123"))
            .await
            .unwrap();
        assert_eq!(res.user.email, "ada@example.com");
        let claims = keys.verify(&res.access_token).unwrap();
        assert_eq!(claims.sub, res.user.id);
    }

    #[tokio::test]
    async fn signup_rejects_mismatch_short_and_duplicate() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let repo = state.repo.as_ref();

        let mut req = signup_req("a@example.com", "password123");
        req.password2 = "password124".into();
        assert!(matches!(signup(repo, &keys, req).await, Err(ApiError::Validation(_))));

        let req = signup_req("a@example.com", "short");
        assert!(matches!(signup(repo, &keys, req).await, Err(ApiError::Validation(_))));

        signup(repo, &keys, signup_req("a@example.com", "password123")).await.unwrap();
        let dup = signup(repo, &keys, signup_req("A@example.com", "password123")).await;
        assert!(matches!(dup, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let repo = state.repo.as_ref();
        signup(repo, &keys, signup_req("a@example.com", "password123")).await.unwrap();

        let ok = login(
            repo,
            &keys,
            LoginRequest {
                email: "a@example.com".into(),
                password: "password123".into(),
            },
        )
        .await;
        assert!(ok.is_ok());

        let bad = login(
            repo,
            &keys,
            LoginRequest {
                email: "a@example.com".into(),
                password: "wrong-password".into(),
            },
        )
        .await;
        assert!(matches!(bad, Err(ApiError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_replay() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let repo = state.repo.as_ref();
        let first = signup(repo, &keys, signup_req("a@example.com", "password123")).await.unwrap();

        let second = refresh(repo, &keys, &first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let replay = refresh(repo, &keys, &first.refresh_token).await;
        assert!(matches!(replay, Err(ApiError::InvalidToken(_))));

        let wrong_kind = refresh(repo, &keys, &second.access_token).await;
        assert!(matches!(wrong_kind, Err(ApiError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn logout_revokes_refresh_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let repo = state.repo.as_ref();
        let session = signup(repo, &keys, signup_req("a@example.com", "password123")).await.unwrap();
        let actor = repo.get_user(session.user.id).await.unwrap().unwrap();

        logout(repo, &keys, &actor, &session.refresh_token).await.unwrap();

        let again = logout(repo, &keys, &actor, &session.refresh_token).await;
        assert!(matches!(again, Err(ApiError::InvalidToken(_))));
        let malformed = logout(repo, &keys, &actor, "garbage").await;
        assert!(matches!(malformed, Err(ApiError::InvalidToken(_))));
        let refreshed = refresh(repo, &keys, &session.refresh_token).await;
        assert!(matches!(refreshed, Err(ApiError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn logout_purges_expired_revocations() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let repo = state.repo.as_ref();
        let session = signup(repo, &keys, signup_req("a@example.com", "password123")).await.unwrap();
        let actor = repo.get_user(session.user.id).await.unwrap().unwrap();

        let stale = uuid::Uuid::new_v4();
        let past = OffsetDateTime::now_utc() - time::Duration::hours(1);
        repo.revoke_token(stale, actor.id, past).await.unwrap();

        logout(repo, &keys, &actor, &session.refresh_token).await.unwrap();
        assert!(!repo.is_token_revoked(stale).await.unwrap());
        let current = keys.verify_refresh(&session.refresh_token).unwrap();
        assert!(repo.is_token_revoked(current.jti).await.unwrap());
    }

    #[tokio::test]
    async fn logout_rejects_someone_elses_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let repo = state.repo.as_ref();
        let a = signup(repo, &keys, signup_req("a@example.com", "password123")).await.unwrap();
        let b = signup(repo, &keys, signup_req("b@example.com", "password123")).await.unwrap();
        let actor_b = repo.get_user(b.user.id).await.unwrap().unwrap();

        let res = logout(repo, &keys, &actor_b, &a.refresh_token).await;
        assert!(matches!(res, Err(ApiError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn superuser_seed_is_idempotent() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let seed = SuperuserSeed {
            email: "root@example.com".into(),
            password: "password123".into(),
        };
        ensure_superuser(repo, &seed).await.unwrap();
        ensure_superuser(repo, &seed).await.unwrap();

        let users = repo.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_superuser && users[0].is_staff);
    }
}
