use tracing::debug;

use crate::task::{Priority, Status};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_SORT_BY: &str = "dueDate";

/// Columns the server accepts in `sortBy`. Anything else falls back to the
/// server default, so catch it client-side before a request goes out.
pub const SORTABLE_COLUMNS: [&str; 5] = ["title", "dueDate", "priority", "status", "id"];

/// Client-held filter/paging state. Drives which task page is fetched;
/// mutated only by the dashboard and the list/search commands.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub search: String,
    pub page: u32,
    pub size: u32,
    pub sort_by: String,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            status: None,
            priority: None,
            search: String::new(),
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort_by: DEFAULT_SORT_BY.to_string(),
        }
    }
}

impl TaskQuery {
    /// Outbound query parameters. Only explicitly-set values are sent:
    /// `page` and `size` always carry a value, `sortBy` only when non-blank,
    /// and blank status/priority/search are omitted entirely.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
        ];

        if !self.sort_by.trim().is_empty() {
            params.push(("sortBy".to_string(), self.sort_by.clone()));
        }
        if let Some(status) = self.status {
            params.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            params.push(("priority".to_string(), priority.as_str().to_string()));
        }

        debug!(?params, "built task query params");
        params
    }

    /// Same contract as [`to_params`](Self::to_params) plus the required
    /// title substring for the search endpoint.
    pub fn to_search_params(&self, title: &str) -> Vec<(String, String)> {
        let mut params = vec![("title".to_string(), title.to_string())];
        params.extend(self.to_params());
        params
    }

    pub fn is_sortable(column: &str) -> bool {
        SORTABLE_COLUMNS.contains(&column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filters_are_omitted() {
        let query = TaskQuery {
            page: 1,
            ..TaskQuery::default()
        };

        let params = query.to_params();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["page", "size", "sortBy"]);
        assert!(params.contains(&("page".to_string(), "1".to_string())));
        assert!(params.contains(&("sortBy".to_string(), "dueDate".to_string())));
    }

    #[test]
    fn blank_sort_by_is_omitted() {
        let query = TaskQuery {
            sort_by: "  ".to_string(),
            ..TaskQuery::default()
        };
        assert!(!query.to_params().iter().any(|(k, _)| k == "sortBy"));
    }

    #[test]
    fn set_filters_are_sent() {
        let query = TaskQuery {
            status: Some(Status::Pending),
            priority: Some(Priority::High),
            ..TaskQuery::default()
        };

        let params = query.to_params();
        assert!(params.contains(&("status".to_string(), "PENDING".to_string())));
        assert!(params.contains(&("priority".to_string(), "HIGH".to_string())));
    }

    #[test]
    fn search_params_lead_with_title() {
        let query = TaskQuery::default();
        let params = query.to_search_params("report");
        assert_eq!(params[0], ("title".to_string(), "report".to_string()));
        assert!(params.iter().any(|(k, _)| k == "page"));
    }

    #[test]
    fn sortable_columns() {
        assert!(TaskQuery::is_sortable("dueDate"));
        assert!(!TaskQuery::is_sortable("createdAt"));
    }
}
