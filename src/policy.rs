//! Authorization predicates.
//!
//! Every check is a pure function of the actor, the requested [`Method`] and
//! the already-resolved resources. Resolution (and the `NotFound` it may
//! produce) happens in the service layer before any predicate runs.

use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{Authored, Comment, Issue, Project, User};

/// Operation requested on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Read,
    Create,
    Update,
    Delete,
}

impl Method {
    pub fn is_read(self) -> bool {
        matches!(self, Method::Read)
    }
}

/// Account-management endpoints guarded by [`is_self_or_superuser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountAction {
    Profile,
    Password,
    Delete,
}

/// The single place where the superuser bypass is decided.
pub fn superuser_override(actor: &User) -> bool {
    actor.is_superuser && actor.is_active
}

fn owns<T: Authored>(actor: &User, target: &T) -> bool {
    target.author_id() == actor.id
}

/// A project together with the actor's membership in it.
#[derive(Debug, Clone, Copy)]
pub struct ProjectAccess<'a> {
    pub project: &'a Project,
    pub is_contributor: bool,
}

impl<'a> ProjectAccess<'a> {
    pub fn new(project: &'a Project, is_contributor: bool) -> Self {
        Self {
            project,
            is_contributor,
        }
    }

    pub fn is_author(&self, actor: &User) -> bool {
        owns(actor, self.project)
    }

    /// Author or contributor.
    pub fn is_member(&self, actor: &User) -> bool {
        self.is_contributor || self.is_author(actor)
    }

    fn visible_to(&self, actor: &User) -> bool {
        self.is_member(actor) || superuser_override(actor)
    }

    fn managed_by(&self, actor: &User) -> bool {
        self.is_author(actor) || superuser_override(actor)
    }
}

pub fn can_access_project(actor: &User, access: ProjectAccess<'_>, method: Method) -> bool {
    match method {
        Method::Read => access.visible_to(actor),
        Method::Create => true,
        Method::Update | Method::Delete => access.managed_by(actor),
    }
}

pub fn can_access_contributor_list(actor: &User, access: ProjectAccess<'_>, method: Method) -> bool {
    if method.is_read() {
        access.visible_to(actor)
    } else {
        access.managed_by(actor)
    }
}

/// Invariants for adding `candidate` to `project`. Whether the actor may add
/// contributors at all is decided by [`can_access_contributor_list`].
pub fn check_add_contributor(
    project: &Project,
    candidate: &User,
    already_contributor: bool,
) -> Result<(), ApiError> {
    if candidate.id == project.author_id {
        return Err(ApiError::Validation(
            "An author cannot be added as a contributor".into(),
        ));
    }
    if already_contributor {
        return Err(ApiError::Validation(
            crate::store::DUPLICATE_CONTRIBUTOR.into(),
        ));
    }
    Ok(())
}

/// Seeing the project is enough to read or file issues; changing one takes
/// authorship (or the superuser override).
pub fn can_access_issue(
    actor: &User,
    access: ProjectAccess<'_>,
    method: Method,
    issue: Option<&Issue>,
) -> bool {
    authored_child_access(actor, access, method, issue)
}

pub fn can_access_comment(
    actor: &User,
    access: ProjectAccess<'_>,
    method: Method,
    comment: Option<&Comment>,
) -> bool {
    authored_child_access(actor, access, method, comment)
}

fn authored_child_access<T: Authored>(
    actor: &User,
    access: ProjectAccess<'_>,
    method: Method,
    target: Option<&T>,
) -> bool {
    match method {
        Method::Read | Method::Create => access.visible_to(actor),
        Method::Update | Method::Delete => {
            if superuser_override(actor) {
                return true;
            }
            match target {
                Some(t) => access.is_member(actor) && owns(actor, t),
                None => false,
            }
        }
    }
}

pub fn is_self_or_superuser(actor: &User, target_id: Uuid, method: Method, action: AccountAction) -> bool {
    if method.is_read() {
        return true;
    }
    if actor.id == target_id {
        return true;
    }
    action == AccountAction::Delete && method == Method::Delete && superuser_override(actor)
}

/// Maps a denied predicate to `Forbidden`.
pub fn ensure(allowed: bool) -> Result<(), ApiError> {
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}
