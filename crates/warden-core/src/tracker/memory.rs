//! In-process tracker. Holds issues, timelines, comments and pull requests in
//! memory and records every mutation, so flows can be asserted without a network.

use super::IssueTracker;
use crate::error::{Result, WardenError};
use crate::types::{
    Issue, IssueComment, IssueState, PullRequest, RepoRef, TimelineEvent, User, UserKind,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

type IssueKey = (RepoRef, u64);

#[derive(Default)]
struct MemoryState {
    issues: HashMap<IssueKey, Issue>,
    timelines: HashMap<IssueKey, Vec<TimelineEvent>>,
    comments: HashMap<IssueKey, Vec<IssueComment>>,
    pull_requests: Vec<PullRequest>,
    approved: HashSet<IssueKey>,
    users: HashMap<String, u64>,
    failing_threads: HashSet<IssueKey>,
    user_lookups: usize,
    next_comment_id: u64,
}

#[derive(Default)]
pub struct MemoryTracker {
    state: Mutex<MemoryState>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub fn insert_issue(&self, issue: Issue) {
        let mut state = self.lock();
        for user in issue.assignees.iter().chain(issue.assignee.iter()) {
            state.users.insert(user.login.to_lowercase(), user.id);
        }
        state.issues.insert((issue.repo.clone(), issue.number), issue);
    }

    pub fn push_timeline(&self, repo: &RepoRef, number: u64, event: TimelineEvent) {
        let mut state = self.lock();
        if let Some(actor) = &event.actor {
            state.users.insert(actor.login.to_lowercase(), actor.id);
        }
        state
            .timelines
            .entry((repo.clone(), number))
            .or_default()
            .push(event);
    }

    pub fn push_comment(&self, repo: &RepoRef, number: u64, comment: IssueComment) {
        let mut state = self.lock();
        state.next_comment_id = state.next_comment_id.max(comment.id);
        state
            .comments
            .entry((repo.clone(), number))
            .or_default()
            .push(comment);
    }

    pub fn insert_pull_request(&self, pr: PullRequest) {
        self.lock().pull_requests.push(pr);
    }

    pub fn insert_user(&self, user: &User) {
        self.lock().users.insert(user.login.to_lowercase(), user.id);
    }

    pub fn approve(&self, repo: &RepoRef, number: u64) {
        self.lock().approved.insert((repo.clone(), number));
    }

    pub fn set_state(&self, repo: &RepoRef, number: u64, issue_state: IssueState) {
        if let Some(issue) = self.lock().issues.get_mut(&(repo.clone(), number)) {
            issue.state = issue_state;
        }
    }

    /// Make every comment creation on this issue or pull request fail.
    pub fn fail_comments_on(&self, repo: &RepoRef, number: u64) {
        self.lock().failing_threads.insert((repo.clone(), number));
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn comments(&self, repo: &RepoRef, number: u64) -> Vec<IssueComment> {
        self.lock()
            .comments
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn issue(&self, repo: &RepoRef, number: u64) -> Option<Issue> {
        self.lock().issues.get(&(repo.clone(), number)).cloned()
    }

    /// Number of `resolve_user_id` calls served so far.
    pub fn user_lookups(&self) -> usize {
        self.lock().user_lookups
    }

    fn find_comment<'a>(
        state: &'a mut MemoryState,
        repo: &RepoRef,
        comment_id: u64,
    ) -> Option<&'a mut IssueComment> {
        state
            .comments
            .iter_mut()
            .filter(|((r, _), _)| r == repo)
            .flat_map(|(_, list)| list.iter_mut())
            .find(|c| c.id == comment_id)
    }
}

fn not_found(what: String) -> WardenError {
    WardenError::Api {
        status: 404,
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue> {
        self.issue(repo, number)
            .ok_or_else(|| not_found(format!("issue {repo}#{number}")))
    }

    async fn list_assigned_issues(&self, repo: &RepoRef) -> Result<Vec<Issue>> {
        let state = self.lock();
        let mut issues: Vec<Issue> = state
            .issues
            .values()
            .filter(|i| &i.repo == repo && i.is_open() && !i.current_assignees().is_empty())
            .cloned()
            .collect();
        issues.sort_by_key(|i| i.number);
        Ok(issues)
    }

    async fn list_timeline(&self, repo: &RepoRef, number: u64) -> Result<Vec<TimelineEvent>> {
        Ok(self
            .lock()
            .timelines
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_comments(&self, repo: &RepoRef, number: u64) -> Result<Vec<IssueComment>> {
        Ok(self.comments(repo, number))
    }

    async fn get_comment(&self, repo: &RepoRef, comment_id: u64) -> Result<IssueComment> {
        let mut state = self.lock();
        Self::find_comment(&mut state, repo, comment_id)
            .map(|c| c.clone())
            .ok_or_else(|| not_found(format!("comment {comment_id} in {repo}")))
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let mut state = self.lock();
        let key = (repo.clone(), number);
        if state.failing_threads.contains(&key) {
            return Err(WardenError::Api {
                status: 500,
                message: format!("cannot comment on {repo}#{number}"),
            });
        }
        state.next_comment_id += 1;
        let comment = IssueComment {
            id: state.next_comment_id,
            body: body.to_string(),
            created_at: Utc::now(),
            author: Some(User::bot("warden[bot]", 1)),
        };
        state.comments.entry(key).or_default().push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(&self, repo: &RepoRef, comment_id: u64, body: &str) -> Result<()> {
        let mut state = self.lock();
        let comment = Self::find_comment(&mut state, repo, comment_id)
            .ok_or_else(|| not_found(format!("comment {comment_id} in {repo}")))?;
        comment.body = body.to_string();
        Ok(())
    }

    async fn remove_assignees(
        &self,
        repo: &RepoRef,
        number: u64,
        logins: &[String],
    ) -> Result<()> {
        let mut state = self.lock();
        let issue = state
            .issues
            .get_mut(&(repo.clone(), number))
            .ok_or_else(|| not_found(format!("issue {repo}#{number}")))?;

        let mut rejected = Vec::new();
        issue.assignees.retain(|u| {
            if !logins.contains(&u.login) {
                return true;
            }
            if u.kind == UserKind::Bot {
                rejected.push(u.login.clone());
                return true;
            }
            false
        });
        if issue
            .assignee
            .as_ref()
            .is_some_and(|u| logins.contains(&u.login) && u.kind == UserKind::Human)
        {
            issue.assignee = None;
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(WardenError::Api {
                status: 422,
                message: format!("cannot unassign bot accounts: {}", rejected.join(", ")),
            })
        }
    }

    async fn search_pull_requests(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<PullRequest>> {
        let needle = format!("#{issue_number}");
        Ok(self
            .lock()
            .pull_requests
            .iter()
            .filter(|pr| &pr.repo == repo)
            .filter(|pr| pr.body.as_deref().is_some_and(|b| b.contains(&needle)))
            .cloned()
            .collect())
    }

    async fn pull_request_approved(&self, repo: &RepoRef, number: u64) -> Result<bool> {
        Ok(self.lock().approved.contains(&(repo.clone(), number)))
    }

    async fn resolve_user_id(&self, login: &str) -> Result<Option<u64>> {
        let mut state = self.lock();
        state.user_lookups += 1;
        Ok(state.users.get(&login.to_lowercase()).copied())
    }
}
