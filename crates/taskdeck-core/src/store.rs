//! Client-side task page store.
//!
//! Holds the one cached page the dashboard renders, the active
//! filter/sort/pagination state and the query phase. Page loads are tagged
//! with a sequence number so a slow, superseded response can never clobber
//! newer state.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::protocol::PageBlock;
use crate::query::TaskQuery;
use crate::task::{Task, TaskChanges, TaskDraft};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryPhase {
    #[default]
    Idle,
    Loading,
    Success,
    Error(String),
}

#[derive(Debug, Default)]
pub struct TaskStore {
    pub tasks: Vec<Task>,
    pub total: u64,
    pub phase: QueryPhase,
    pub query: TaskQuery,
    next_seq: u64,
    applied_seq: u64,
}

impl TaskStore {
    pub fn new(query: TaskQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Start a page load: marks the store loading and hands out the sequence
    /// number the eventual response must present to [`apply_page`](Self::apply_page).
    pub fn begin_load(&mut self) -> u64 {
        self.next_seq += 1;
        self.phase = QueryPhase::Loading;
        debug!(seq = self.next_seq, "page load started");
        self.next_seq
    }

    /// Apply a page-load outcome. Returns false (and changes nothing) when a
    /// newer load already landed.
    pub fn apply_page(&mut self, seq: u64, outcome: Result<PageBlock, &ApiError>) -> bool {
        if seq <= self.applied_seq {
            warn!(seq, applied = self.applied_seq, "discarding stale page response");
            return false;
        }
        self.applied_seq = seq;

        match outcome {
            Ok(page) => {
                debug!(
                    seq,
                    count = page.data.len(),
                    total = page.total_elements,
                    "page applied"
                );
                self.tasks = page.data;
                self.total = page.total_elements;
                self.phase = QueryPhase::Success;
            }
            Err(err) => {
                warn!(seq, error = %err, "page load failed");
                self.phase = QueryPhase::Error(err.to_string());
            }
        }
        true
    }

    /// One-shot fetch/search honoring the current filter state: blank search
    /// text hits the list endpoint, anything else the search endpoint.
    #[tracing::instrument(skip(self, client))]
    pub async fn load(&mut self, client: &ApiClient) -> Result<(), ApiError> {
        let seq = self.begin_load();
        let query = self.query.clone();
        let outcome = if query.search.trim().is_empty() {
            client.fetch_tasks(&query).await
        } else {
            client.search_tasks(query.search.trim(), &query).await
        };

        match outcome {
            Ok(page) => {
                self.apply_page(seq, Ok(page));
                Ok(())
            }
            Err(err) => {
                self.apply_page(seq, Err(&err));
                Err(err)
            }
        }
    }

    /// Create on the server, then prepend to the cached page.
    #[tracing::instrument(skip(self, client, draft), fields(title = %draft.title))]
    pub async fn create(&mut self, client: &ApiClient, draft: &TaskDraft) -> Result<Task, ApiError> {
        let task = client.create_task(draft).await?;
        self.apply_created(task.clone());
        Ok(task)
    }

    /// Update on the server, then replace the cached item by id.
    #[tracing::instrument(skip(self, client, changes), fields(%id))]
    pub async fn update(
        &mut self,
        client: &ApiClient,
        id: Uuid,
        changes: &TaskChanges,
    ) -> Result<Task, ApiError> {
        let task = client.update_task(id, changes).await?;
        self.apply_updated(task.clone());
        Ok(task)
    }

    /// Delete on the server, then remove the cached item by id.
    #[tracing::instrument(skip(self, client), fields(%id))]
    pub async fn delete(&mut self, client: &ApiClient, id: Uuid) -> Result<(), ApiError> {
        client.delete_task(id).await?;
        self.apply_deleted(id);
        Ok(())
    }

    pub fn apply_created(&mut self, task: Task) {
        info!(id = %task.id, "task cached (prepend)");
        self.tasks.insert(0, task);
        self.total += 1;
    }

    pub fn apply_updated(&mut self, task: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
            info!(id = %task.id, "task cache entry replaced");
            *slot = task;
        } else {
            debug!(id = %task.id, "updated task not on cached page");
        }
    }

    pub fn apply_deleted(&mut self, id: Uuid) {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        if self.tasks.len() < before {
            info!(%id, "task removed from cache");
            self.total = self.total.saturating_sub(1);
        }
    }

    pub fn find(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn total_pages(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let size = u64::from(self.query.size.max(1));
        u32::try_from(self.total.div_ceil(size)).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::task::{Priority, Status};

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            due_date: NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
            priority: Priority::Medium,
            status: Status::Pending,
        }
    }

    fn page(tasks: Vec<Task>, total: u64) -> PageBlock {
        PageBlock {
            current_page: 0,
            total_pages: 1,
            total_elements: total,
            page_size: 10,
            data: tasks,
        }
    }

    #[test]
    fn create_update_delete_change_length_by_one_zero_one() {
        let mut store = TaskStore::default();
        let seq = store.begin_load();
        store.apply_page(seq, Ok(page(vec![task("a"), task("b")], 2)));
        assert_eq!(store.tasks.len(), 2);

        let created = task("c");
        store.apply_created(created.clone());
        assert_eq!(store.tasks.len(), 3);
        assert_eq!(store.tasks[0].id, created.id);
        assert_eq!(store.total, 3);

        let mut renamed = created.clone();
        renamed.title = "c2".to_string();
        store.apply_updated(renamed);
        assert_eq!(store.tasks.len(), 3);
        assert_eq!(store.tasks[0].title, "c2");

        store.apply_deleted(created.id);
        assert_eq!(store.tasks.len(), 2);
        assert_eq!(store.total, 2);
    }

    #[test]
    fn update_for_unknown_id_is_a_no_op() {
        let mut store = TaskStore::default();
        let seq = store.begin_load();
        store.apply_page(seq, Ok(page(vec![task("a")], 1)));

        store.apply_updated(task("elsewhere"));
        assert_eq!(store.tasks.len(), 1);
        assert_eq!(store.tasks[0].title, "a");
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut store = TaskStore::default();
        let old_seq = store.begin_load();
        let new_seq = store.begin_load();

        assert!(store.apply_page(new_seq, Ok(page(vec![task("fresh")], 1))));
        assert!(!store.apply_page(old_seq, Ok(page(vec![task("stale")], 5))));

        assert_eq!(store.tasks[0].title, "fresh");
        assert_eq!(store.total, 1);
        assert_eq!(store.phase, QueryPhase::Success);
    }

    #[test]
    fn stale_error_cannot_mask_fresh_success() {
        let mut store = TaskStore::default();
        let old_seq = store.begin_load();
        let new_seq = store.begin_load();

        store.apply_page(new_seq, Ok(page(vec![task("fresh")], 1)));
        store.apply_page(
            old_seq,
            Err(&ApiError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        );

        assert_eq!(store.phase, QueryPhase::Success);
    }

    #[test]
    fn error_outcome_sets_error_phase() {
        let mut store = TaskStore::default();
        let seq = store.begin_load();
        assert_eq!(store.phase, QueryPhase::Loading);

        store.apply_page(
            seq,
            Err(&ApiError::Api {
                status: 500,
                message: "Unexpected server error".to_string(),
            }),
        );
        assert_eq!(store.phase, QueryPhase::Error("Unexpected server error".to_string()));
    }

    #[test]
    fn total_pages_rounds_up() {
        let mut store = TaskStore::default();
        let seq = store.begin_load();
        store.apply_page(seq, Ok(page(vec![task("a")], 21)));
        assert_eq!(store.total_pages(), 3);
    }
}
