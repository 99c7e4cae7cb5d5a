use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use super::jwt::AuthUser;
use crate::{error::ApiError, state::AppState, store::User};

/// The authenticated, still-active account behind the bearer token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;

        match state.repo.get_user(user_id).await? {
            Some(user) if user.is_active => Ok(CurrentUser(user)),
            Some(_) => {
                warn!(%user_id, "token for inactive user");
                Err(ApiError::Unauthenticated("User is inactive".into()))
            }
            None => {
                warn!(%user_id, "token for unknown user");
                Err(ApiError::Unauthenticated("User not found".into()))
            }
        }
    }
}
