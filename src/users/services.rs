use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{DeleteUserRequest, PublicUser, UpdatePasswordRequest, UpdateUserRequest};
use crate::{
    auth::{
        password::{hash_password, verify_password},
        services::{check_new_password, is_valid_email, normalize_email},
    },
    error::ApiError,
    extract::Body,
    policy::{ensure, is_self_or_superuser, AccountAction, Method},
    store::{Repository, User, UserChanges},
    validate::{bounded, NAME_TEXT},
};

fn password_mismatch() -> ApiError {
    ApiError::Validation("The password does not match".into())
}

async fn resolve_user(repo: &dyn Repository, id: Uuid) -> Result<User, ApiError> {
    repo.get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Public profiles of the users referenced by a batch of records.
pub(crate) struct UserDirectory(HashMap<Uuid, PublicUser>);

impl UserDirectory {
    pub(crate) async fn load(
        repo: &dyn Repository,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<Self, ApiError> {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let users = repo.list_users_by_ids(&ids).await?;
        Ok(Self(users.into_iter().map(|u| (u.id, PublicUser::from(u))).collect()))
    }

    /// Deletes cascade, so a referenced user always exists.
    pub(crate) fn get(&self, id: Uuid) -> Result<PublicUser, ApiError> {
        self.0
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("referenced user {id} is missing")))
    }
}

pub async fn list_users(repo: &dyn Repository, _actor: &User) -> Result<Vec<User>, ApiError> {
    Ok(repo.list_users().await?)
}

pub async fn get_user(repo: &dyn Repository, actor: &User, id: Uuid) -> Result<User, ApiError> {
    let target = resolve_user(repo, id).await?;
    ensure(is_self_or_superuser(actor, target.id, Method::Read, AccountAction::Profile))?;
    Ok(target)
}

pub async fn update_user(
    repo: &dyn Repository,
    actor: &User,
    id: Uuid,
    req: Body<UpdateUserRequest>,
) -> Result<User, ApiError> {
    let target = resolve_user(repo, id).await?;
    ensure(is_self_or_superuser(actor, target.id, Method::Update, AccountAction::Profile))?;
    let req = req?;

    let email = match req.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            if !is_valid_email(&email) {
                return Err(ApiError::Validation("Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };
    let changes = UserChanges {
        email,
        first_name: req
            .first_name
            .map(|v| bounded("first_name", &v, NAME_TEXT))
            .transpose()?,
        last_name: req
            .last_name
            .map(|v| bounded("last_name", &v, NAME_TEXT))
            .transpose()?,
    };

    let updated = repo
        .update_user(target.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!(user_id = %updated.id, "user updated");
    Ok(updated)
}

/// Self-only: even a superuser cannot reset someone else's password here.
pub async fn update_password(
    repo: &dyn Repository,
    actor: &User,
    id: Uuid,
    req: Body<UpdatePasswordRequest>,
) -> Result<(), ApiError> {
    let target = resolve_user(repo, id).await?;
    ensure(is_self_or_superuser(actor, target.id, Method::Update, AccountAction::Password))?;
    let req = req?;

    if !verify_password(&req.old_password, &target.password_hash)? {
        warn!(user_id = %target.id, "password update with wrong current password");
        return Err(password_mismatch());
    }
    check_new_password(&req.new_password)?;

    let hash = hash_password(&req.new_password)?;
    if !repo.set_password(target.id, &hash).await? {
        return Err(ApiError::not_found("User"));
    }
    info!(user_id = %target.id, "password updated");
    Ok(())
}

/// The actor confirms with their own password, also when a superuser
/// removes another account.
pub async fn delete_user(
    repo: &dyn Repository,
    actor: &User,
    id: Uuid,
    req: Body<DeleteUserRequest>,
) -> Result<(), ApiError> {
    let target = resolve_user(repo, id).await?;
    ensure(is_self_or_superuser(actor, target.id, Method::Delete, AccountAction::Delete))?;
    let req = req?;

    if !verify_password(&req.password, &actor.password_hash)? {
        warn!(user_id = %actor.id, target_id = %target.id, "account deletion with wrong password");
        return Err(password_mismatch());
    }

    if !repo.delete_user(target.id).await? {
        return Err(ApiError::not_found("User"));
    }
    info!(user_id = %target.id, deleted_by = %actor.id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use crate::store::NewUser;

    async fn make_user(repo: &dyn Repository, email: &str, superuser: bool) -> User {
        repo.create_user(NewUser {
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: hash_password("password123").unwrap(),
            is_staff: superuser,
            is_superuser: superuser,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn profile_update_is_self_only() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        let other = make_user(repo, "other@example.com", false).await;
        let admin = make_user(repo, "root@example.com", true).await;

        let req = || UpdateUserRequest {
            email: None,
            first_name: Some("Grace".into()),
            last_name: None,
        };
        let updated = update_user(repo, &me, me.id, Ok(req())).await.unwrap();
        assert_eq!(updated.first_name, "Grace");

        assert!(matches!(update_user(repo, &other, me.id, Ok(req())).await, Err(ApiError::Forbidden(_))));
        assert!(matches!(update_user(repo, &admin, me.id, Ok(req())).await, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn email_change_to_taken_address_fails_validation() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        make_user(repo, "other@example.com", false).await;

        let res = update_user(
            repo,
            &me,
            me.id,
            Ok(UpdateUserRequest {
                email: Some("Other@Example.com".into()),
                first_name: None,
                last_name: None,
            }),
        )
        .await;
        assert!(matches!(res, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn directory_resolves_each_referenced_user_once() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        let other = make_user(repo, "other@example.com", false).await;

        let dir = UserDirectory::load(repo, [me.id, other.id, me.id]).await.unwrap();
        assert_eq!(dir.get(other.id).unwrap().email, "other@example.com");
        assert!(matches!(dir.get(Uuid::new_v4()), Err(ApiError::Internal(_))));
    }

    #[tokio::test]
    async fn forbidden_wins_over_unreadable_body() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        let other = make_user(repo, "other@example.com", false).await;

        let unreadable = || Err(ApiError::Validation("missing field `password`".into()));
        assert!(matches!(
            delete_user(repo, &other, me.id, unreadable()).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            delete_user(repo, &me, me.id, unreadable()).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            delete_user(repo, &me, Uuid::new_v4(), unreadable()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        assert!(matches!(get_user(repo, &me, Uuid::new_v4()).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn password_update_requires_current_password() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;

        let bad = update_password(
            repo,
            &me,
            me.id,
            Ok(UpdatePasswordRequest {
                old_password: "nope-nope".into(),
                new_password: "brand-new-pass".into(),
            }),
        )
        .await;
        assert!(matches!(bad, Err(ApiError::Validation(ref m)) if m.contains("does not match")));

        update_password(
            repo,
            &me,
            me.id,
            Ok(UpdatePasswordRequest {
                old_password: "password123".into(),
                new_password: "brand-new-pass".into(),
            }),
        )
        .await
        .unwrap();
        let stored = repo.get_user(me.id).await.unwrap().unwrap();
        assert!(verify_password("brand-new-pass", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn superuser_cannot_change_someone_elses_password() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        let admin = make_user(repo, "root@example.com", true).await;

        let res = update_password(
            repo,
            &admin,
            me.id,
            Ok(UpdatePasswordRequest {
                old_password: "password123".into(),
                new_password: "brand-new-pass".into(),
            }),
        )
        .await;
        assert!(matches!(res, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn delete_with_wrong_password_keeps_account() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;

        let res = delete_user(repo, &me, me.id, Ok(DeleteUserRequest { password: "wrong-one".into() })).await;
        assert!(matches!(res, Err(ApiError::Validation(_))));
        assert!(repo.get_user(me.id).await.unwrap().is_some());

        delete_user(repo, &me, me.id, Ok(DeleteUserRequest { password: "password123".into() }))
            .await
            .unwrap();
        assert!(repo.get_user(me.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn superuser_may_delete_other_accounts() {
        let state = AppState::fake();
        let repo = state.repo.as_ref();
        let me = make_user(repo, "me@example.com", false).await;
        let other = make_user(repo, "other@example.com", false).await;
        let admin = make_user(repo, "root@example.com", true).await;

        let res = delete_user(repo, &other, me.id, Ok(DeleteUserRequest { password: "password123".into() })).await;
        assert!(matches!(res, Err(ApiError::Forbidden(_))));

        delete_user(repo, &admin, me.id, Ok(DeleteUserRequest { password: "password123".into() }))
            .await
            .unwrap();
        assert!(repo.get_user(me.id).await.unwrap().is_none());
    }
}
