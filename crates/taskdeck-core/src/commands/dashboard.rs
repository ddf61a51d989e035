//! Interactive dashboard loop.
//!
//! Free text re-runs the search after the debounce interval; `:`-prefixed
//! directives change filters, page or sort and reload immediately. Loads are
//! spawned without cancelling their predecessors; the store's sequence guard
//! keeps late responses from clobbering newer state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Local;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument, warn};

use crate::client::ApiClient;
use crate::config::Config;
use crate::debounce::{Debouncer, SEARCH_DEBOUNCE};
use crate::query::TaskQuery;
use crate::render::Renderer;
use crate::store::{QueryPhase, TaskStore};

#[instrument(skip(client, cfg, renderer))]
pub(super) async fn cmd_dashboard(
    client: Arc<ApiClient>,
    cfg: &Config,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    info!("command dashboard");

    let debounce = cfg
        .get_u32("search.debounce")?
        .map(|ms| Duration::from_millis(u64::from(ms)))
        .unwrap_or(SEARCH_DEBOUNCE);

    if let Some(user) = client.session().user() {
        renderer.print_greeting(&user.display_name())?;
    }
    println!("Type to search; directives: :page N, :sort COL, :status [X], :priority [X], :clear, :quit");

    let store = Arc::new(Mutex::new(TaskStore::new(super::base_query(cfg)?)));
    let renderer = Arc::new(Mutex::new(renderer.clone()));
    let mut debouncer = Debouncer::default();

    reload(
        Arc::clone(&client),
        Arc::clone(&store),
        Arc::clone(&renderer),
    )
    .await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();

        if let Some(directive) = line.strip_prefix(':') {
            // A directive supersedes whatever search was still pending.
            debouncer.cancel();

            let mut parts = directive.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let arg = parts.next();

            if matches!(name, "quit" | "q") {
                break;
            }

            match apply_directive(&store, name, arg) {
                Ok(()) => {
                    reload(
                        Arc::clone(&client),
                        Arc::clone(&store),
                        Arc::clone(&renderer),
                    )
                    .await;
                }
                Err(err) => println!("error: {err}"),
            }
            continue;
        }

        // Every keystroke line re-arms the timer; the fetch happens only
        // after a full quiet interval.
        {
            let mut store = store.lock();
            store.query.search = line;
            store.query.page = 0;
        }
        debouncer.schedule(
            debounce,
            reload(
                Arc::clone(&client),
                Arc::clone(&store),
                Arc::clone(&renderer),
            ),
        );
    }

    Ok(())
}

fn apply_directive(
    store: &Mutex<TaskStore>,
    name: &str,
    arg: Option<&str>,
) -> anyhow::Result<()> {
    let mut store = store.lock();
    match name {
        "page" => {
            let page: u32 = arg
                .ok_or_else(|| anyhow!("usage: :page N"))?
                .parse()
                .map_err(|_| anyhow!("page must be a number"))?;
            store.query.page = page;
        }
        "sort" => {
            let column = arg.ok_or_else(|| anyhow!("usage: :sort COL"))?;
            if !TaskQuery::is_sortable(column) {
                return Err(anyhow!(
                    "unsortable column: {column} (expected one of {})",
                    crate::query::SORTABLE_COLUMNS.join(", ")
                ));
            }
            store.query.sort_by = column.to_string();
        }
        "status" => {
            store.query.status = match arg {
                None => None,
                Some(value) => Some(value.parse().map_err(|err| anyhow!("{err}"))?),
            };
            store.query.page = 0;
        }
        "priority" => {
            store.query.priority = match arg {
                None => None,
                Some(value) => Some(value.parse().map_err(|err| anyhow!("{err}"))?),
            };
            store.query.page = 0;
        }
        "clear" => {
            let size = store.query.size;
            let sort_by = store.query.sort_by.clone();
            store.query = TaskQuery {
                size,
                sort_by,
                ..TaskQuery::default()
            };
        }
        other => return Err(anyhow!("unknown directive: :{other}")),
    }
    Ok(())
}

/// One tagged page load: grab a sequence number, hit the service, apply the
/// outcome, and re-render only if it was still the newest.
async fn reload(
    client: Arc<ApiClient>,
    store: Arc<Mutex<TaskStore>>,
    renderer: Arc<Mutex<Renderer>>,
) {
    let (seq, query) = {
        let mut store = store.lock();
        let seq = store.begin_load();
        (seq, store.query.clone())
    };

    let outcome = if query.search.trim().is_empty() {
        client.fetch_tasks(&query).await
    } else {
        client.search_tasks(query.search.trim(), &query).await
    };

    let mut store = store.lock();
    let applied = match outcome {
        Ok(page) => store.apply_page(seq, Ok(page)),
        Err(err) => store.apply_page(seq, Err(&err)),
    };

    if applied {
        render(&store, &mut renderer.lock());
    }
}

fn render(store: &TaskStore, renderer: &mut Renderer) {
    if let QueryPhase::Error(message) = &store.phase {
        let lower = message.to_lowercase();
        if lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("session expired")
        {
            println!("Access denied or session expired. Please log in again.");
        } else {
            println!("error: {message}");
        }
        return;
    }

    if let Err(err) = renderer.print_task_table(store, Local::now().date_naive()) {
        warn!(error = %err, "failed to render task table");
    }
}
