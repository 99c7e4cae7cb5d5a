use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Comment, CommentChanges, Contributor, Issue, IssueChanges, NewComment, NewContributor,
    NewIssue, NewProject, NewUser, Project, ProjectChanges, RepoError, RepoResult, Repository,
    User, UserChanges, DUPLICATE_CONTRIBUTOR, DUPLICATE_EMAIL,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    projects: Vec<Project>,
    contributors: Vec<Contributor>,
    issues: Vec<Issue>,
    comments: Vec<Comment>,
    revoked: HashMap<Uuid, OffsetDateTime>,
}

impl Tables {
    fn remove_issues<F: Fn(&Issue) -> bool>(&mut self, doomed: F) -> usize {
        let ids: HashSet<Uuid> = self
            .issues
            .iter()
            .filter(|i| doomed(*i))
            .map(|i| i.id)
            .collect();
        self.issues.retain(|i| !ids.contains(&i.id));
        self.comments.retain(|c| !ids.contains(&c.issue_id));
        ids.len()
    }

    fn remove_projects<F: Fn(&Project) -> bool>(&mut self, doomed: F) -> usize {
        let ids: HashSet<Uuid> = self
            .projects
            .iter()
            .filter(|p| doomed(*p))
            .map(|p| p.id)
            .collect();
        self.projects.retain(|p| !ids.contains(&p.id));
        self.contributors.retain(|c| !ids.contains(&c.project_id));
        self.remove_issues(|i| ids.contains(&i.project_id));
        ids.len()
    }
}

/// Newest first; among equal timestamps the later insert wins.
fn newest_first<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, at: impl Fn(&T) -> OffsetDateTime) -> Vec<T> {
    let mut out: Vec<T> = rows.rev().collect();
    out.sort_by(|a, b| at(b).cmp(&at(a)));
    out
}

/// In-process repository. All writes go through one lock, so each cascade
/// and each uniqueness check-then-insert is atomic.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(RepoError::Conflict(DUPLICATE_EMAIL.into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            is_staff: new.is_staff,
            is_superuser: new.is_superuser,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn list_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        let mut t = self.tables.write().await;
        if let Some(email) = &changes.email {
            if t.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(RepoError::Conflict(DUPLICATE_EMAIL.into()));
            }
        }
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.email {
            user.email = v;
        }
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        Ok(Some(user.clone()))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        let before = t.users.len();
        t.users.retain(|u| u.id != id);
        if t.users.len() == before {
            return Ok(false);
        }
        t.remove_projects(|p| p.author_id == id);
        t.contributors.retain(|c| c.user_id != id);
        t.remove_issues(|i| i.author_id == id || i.assignee_id == id);
        t.comments.retain(|c| c.author_id != id);
        Ok(true)
    }

    async fn create_project(&self, new: NewProject) -> RepoResult<Project> {
        let mut t = self.tables.write().await;
        let project = Project {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            project_type: new.project_type,
            author_id: new.author_id,
            created_time: OffsetDateTime::now_utc(),
        };
        t.projects.push(project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> RepoResult<Option<Project>> {
        let t = self.tables.read().await;
        Ok(t.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Project>> {
        let t = self.tables.read().await;
        let member_of: HashSet<Uuid> = t
            .contributors
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.project_id)
            .collect();
        let visible = t
            .projects
            .iter()
            .filter(|p| p.author_id == user_id || member_of.contains(&p.id))
            .cloned();
        Ok(newest_first(visible, |p| p.created_time))
    }

    async fn update_project(&self, id: Uuid, changes: ProjectChanges) -> RepoResult<Option<Project>> {
        let mut t = self.tables.write().await;
        let Some(project) = t.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.title {
            project.title = v;
        }
        if let Some(v) = changes.description {
            project.description = v;
        }
        if let Some(v) = changes.project_type {
            project.project_type = v;
        }
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        Ok(t.remove_projects(|p| p.id == id) == 1)
    }

    async fn create_contributor(&self, new: NewContributor) -> RepoResult<Contributor> {
        let mut t = self.tables.write().await;
        if t
            .contributors
            .iter()
            .any(|c| c.user_id == new.user_id && c.project_id == new.project_id)
        {
            return Err(RepoError::Conflict(DUPLICATE_CONTRIBUTOR.into()));
        }
        if !t.projects.iter().any(|p| p.id == new.project_id)
            || !t.users.iter().any(|u| u.id == new.user_id)
        {
            return Err(RepoError::Other(anyhow::anyhow!(
                "contributor references a missing user or project"
            )));
        }
        let contributor = Contributor {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            project_id: new.project_id,
            role: new.role,
            created_time: OffsetDateTime::now_utc(),
        };
        t.contributors.push(contributor.clone());
        Ok(contributor)
    }

    async fn get_contributor(&self, id: Uuid) -> RepoResult<Option<Contributor>> {
        let t = self.tables.read().await;
        Ok(t.contributors.iter().find(|c| c.id == id).cloned())
    }

    async fn find_contributor(&self, project_id: Uuid, user_id: Uuid) -> RepoResult<Option<Contributor>> {
        let t = self.tables.read().await;
        Ok(t
            .contributors
            .iter()
            .find(|c| c.project_id == project_id && c.user_id == user_id)
            .cloned())
    }

    async fn list_contributors(&self, project_id: Uuid) -> RepoResult<Vec<Contributor>> {
        let t = self.tables.read().await;
        let rows = t
            .contributors
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned();
        Ok(newest_first(rows, |c| c.created_time))
    }

    async fn delete_contributor(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        let before = t.contributors.len();
        t.contributors.retain(|c| c.id != id);
        Ok(t.contributors.len() != before)
    }

    async fn create_issue(&self, new: NewIssue) -> RepoResult<Issue> {
        let mut t = self.tables.write().await;
        if !t.projects.iter().any(|p| p.id == new.project_id) {
            return Err(RepoError::Other(anyhow::anyhow!("issue references a missing project")));
        }
        let issue = Issue {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            tag: new.tag,
            priority: new.priority,
            status: new.status,
            project_id: new.project_id,
            author_id: new.author_id,
            assignee_id: new.assignee_id,
            created_time: OffsetDateTime::now_utc(),
        };
        t.issues.push(issue.clone());
        Ok(issue)
    }

    async fn get_issue(&self, id: Uuid) -> RepoResult<Option<Issue>> {
        let t = self.tables.read().await;
        Ok(t.issues.iter().find(|i| i.id == id).cloned())
    }

    async fn list_issues(&self, project_id: Uuid) -> RepoResult<Vec<Issue>> {
        let t = self.tables.read().await;
        let rows = t.issues.iter().filter(|i| i.project_id == project_id).cloned();
        Ok(newest_first(rows, |i| i.created_time))
    }

    async fn update_issue(&self, id: Uuid, changes: IssueChanges) -> RepoResult<Option<Issue>> {
        let mut t = self.tables.write().await;
        let Some(issue) = t.issues.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.title {
            issue.title = v;
        }
        if let Some(v) = changes.description {
            issue.description = v;
        }
        if let Some(v) = changes.tag {
            issue.tag = v;
        }
        if let Some(v) = changes.priority {
            issue.priority = v;
        }
        if let Some(v) = changes.status {
            issue.status = v;
        }
        if let Some(v) = changes.assignee_id {
            issue.assignee_id = v;
        }
        Ok(Some(issue.clone()))
    }

    async fn delete_issue(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        Ok(t.remove_issues(|i| i.id == id) == 1)
    }

    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut t = self.tables.write().await;
        if !t.issues.iter().any(|i| i.id == new.issue_id) {
            return Err(RepoError::Other(anyhow::anyhow!("comment references a missing issue")));
        }
        let comment = Comment {
            id: Uuid::new_v4(),
            description: new.description,
            issue_id: new.issue_id,
            author_id: new.author_id,
            created_time: OffsetDateTime::now_utc(),
        };
        t.comments.push(comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: Uuid) -> RepoResult<Option<Comment>> {
        let t = self.tables.read().await;
        Ok(t.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn list_comments(&self, issue_id: Uuid) -> RepoResult<Vec<Comment>> {
        let t = self.tables.read().await;
        let rows = t.comments.iter().filter(|c| c.issue_id == issue_id).cloned();
        Ok(newest_first(rows, |c| c.created_time))
    }

    async fn update_comment(&self, id: Uuid, changes: CommentChanges) -> RepoResult<Option<Comment>> {
        let mut t = self.tables.write().await;
        let Some(comment) = t.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(v) = changes.description {
            comment.description = v;
        }
        Ok(Some(comment.clone()))
    }

    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        let before = t.comments.len();
        t.comments.retain(|c| c.id != id);
        Ok(t.comments.len() != before)
    }

    async fn revoke_token(&self, jti: Uuid, _user_id: Uuid, expires_at: OffsetDateTime) -> RepoResult<bool> {
        let mut t = self.tables.write().await;
        Ok(t.revoked.insert(jti, expires_at).is_none())
    }

    async fn is_token_revoked(&self, jti: Uuid) -> RepoResult<bool> {
        Ok(self.tables.read().await.revoked.contains_key(&jti))
    }

    async fn purge_expired_revocations(&self, now: OffsetDateTime) -> RepoResult<u64> {
        let mut t = self.tables.write().await;
        let before = t.revoked.len();
        t.revoked.retain(|_, expires_at| *expires_at > now);
        Ok((before - t.revoked.len()) as u64)
    }
}
