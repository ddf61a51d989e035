use anyhow::{Context, anyhow};
use chrono::Local;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::task::{Task, TaskChanges, TaskDraft};
use crate::validate;

use super::{apply_query_mods, base_query, split_words_and_mods};

#[instrument(skip(client, cfg, renderer, args))]
pub(super) async fn cmd_list(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command list");

    let (words, mods) = split_words_and_mods(args);
    if !words.is_empty() {
        return Err(anyhow!(
            "list takes only modifiers; to search by title use: search TEXT"
        ));
    }

    let mut query = base_query(cfg)?;
    apply_query_mods(&mut query, &mods)?;

    let mut store = TaskStore::new(query);
    store.load(client).await.context("failed to fetch tasks")?;

    renderer.print_task_table(&store, Local::now().date_naive())?;
    Ok(())
}

#[instrument(skip(client, cfg, renderer, args))]
pub(super) async fn cmd_search(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command search");

    let (words, mods) = split_words_and_mods(args);
    let text = words.join(" ");
    if text.trim().is_empty() {
        return Err(anyhow!("search requires a title substring"));
    }

    let mut query = base_query(cfg)?;
    apply_query_mods(&mut query, &mods)?;
    query.search = text;

    let mut store = TaskStore::new(query);
    store.load(client).await.context("search failed")?;

    renderer.print_task_table(&store, Local::now().date_naive())?;
    Ok(())
}

#[instrument(skip(client, cfg, args))]
pub(super) async fn cmd_add(
    client: &ApiClient,
    cfg: &Config,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command add");

    let (words, mods) = split_words_and_mods(args);
    let title = words.join(" ");
    validate::title(&title)?;

    let mut due = None;
    let mut priority = "LOW".to_string();
    let mut description = None;
    for (key, value) in &mods {
        match key.as_str() {
            "due" => due = Some(value.clone()),
            "priority" => priority = value.clone(),
            "desc" => description = non_blank(value),
            other => return Err(anyhow!("unknown modifier for add: {other}")),
        }
    }

    let draft = TaskDraft {
        title,
        description,
        due_date: validate::due_date(due.as_deref().unwrap_or_default())?,
        priority: validate::priority(&priority)?,
    };

    let mut store = TaskStore::new(base_query(cfg)?);
    let task = store
        .create(client, &draft)
        .await
        .context("failed to create task")?;

    println!("Created task {} ({}).", short_id(&task), task.title);
    Ok(())
}

#[instrument(skip(client, cfg, args))]
pub(super) async fn cmd_modify(
    client: &ApiClient,
    cfg: &Config,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command modify");

    let (words, mods) = split_words_and_mods(args);
    let Some((id_token, title_words)) = words.split_first() else {
        return Err(anyhow!(
            "usage: modify ID [TITLE...] [due:..] [priority:..] [status:..] [desc:..]"
        ));
    };

    let mut store = TaskStore::new(base_query(cfg)?);
    store.load(client).await.context("failed to fetch tasks")?;

    let Some(task) = find_task(&store, id_token).cloned() else {
        println!("Task {id_token} not found on the current page.");
        return Ok(());
    };

    let mut changes = TaskChanges::from_task(&task);
    if !title_words.is_empty() {
        changes.title = title_words.join(" ");
        validate::title(&changes.title)?;
    }
    for (key, value) in &mods {
        match key.as_str() {
            "due" => changes.due_date = validate::due_date(value)?,
            "priority" => changes.priority = validate::priority(value)?,
            "status" => {
                changes.status = value
                    .parse()
                    .map_err(|err| ApiError::Validation(format!("{err}")))?;
            }
            "desc" => changes.description = non_blank(value),
            other => return Err(anyhow!("unknown modifier for modify: {other}")),
        }
    }

    let updated = store
        .update(client, task.id, &changes)
        .await
        .context("failed to update task")?;

    println!("Modified task {}.", short_id(&updated));
    Ok(())
}

#[instrument(skip(client, cfg, args))]
pub(super) async fn cmd_delete(
    client: &ApiClient,
    cfg: &Config,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let [id_token] = args else {
        return Err(anyhow!("usage: delete ID"));
    };

    let mut store = TaskStore::new(base_query(cfg)?);
    store.load(client).await.context("failed to fetch tasks")?;

    let Some(task) = find_task(&store, id_token).cloned() else {
        println!("Task {id_token} not found on the current page.");
        return Ok(());
    };

    store
        .delete(client, task.id)
        .await
        .context("failed to delete task")?;

    println!("Deleted task {} ({}).", short_id(&task), task.title);
    Ok(())
}

#[instrument(skip(client, cfg, renderer, args))]
pub(super) async fn cmd_info(
    client: &ApiClient,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command info");

    let [id_token] = args else {
        return Err(anyhow!("usage: info ID"));
    };

    let mut store = TaskStore::new(base_query(cfg)?);
    store.load(client).await.context("failed to fetch tasks")?;

    match find_task(&store, id_token) {
        Some(task) => renderer.print_task_info(task),
        None => {
            println!("Task {id_token} not found on the current page.");
            Ok(())
        }
    }
}

/// Resolve an id argument against the cached page: a full UUID or an
/// unambiguous prefix of one.
fn find_task<'a>(store: &'a TaskStore, token: &str) -> Option<&'a Task> {
    if let Ok(id) = token.parse::<Uuid>() {
        return store.find(id);
    }

    let token = token.to_ascii_lowercase();
    let mut matches = store
        .tasks
        .iter()
        .filter(|task| task.id.to_string().starts_with(&token));
    let first = matches.next()?;
    if matches.next().is_some() {
        debug!(%token, "ambiguous task id prefix");
        None
    } else {
        Some(first)
    }
}

fn short_id(task: &Task) -> String {
    task.id.to_string().chars().take(8).collect()
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
