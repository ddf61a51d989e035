mod auth;
mod dashboard;
mod tasks;

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, instrument};

use crate::cli::Invocation;
use crate::client::ApiClient;
use crate::config::Config;
use crate::query::TaskQuery;
use crate::render::Renderer;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "dashboard",
        "delete",
        "help",
        "info",
        "list",
        "login",
        "logout",
        "modify",
        "register",
        "search",
        "theme",
        "version",
        "whoami",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(client, cfg, renderer, inv))]
pub async fn dispatch(
    client: Arc<ApiClient>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.args, "dispatching command");

    match command {
        "register" => auth::cmd_register(&client, &inv.args).await,
        "login" => auth::cmd_login(&client, &inv.args).await,
        "logout" => auth::cmd_logout(&client).await,
        "whoami" => auth::cmd_whoami(&client),
        "theme" => auth::cmd_theme(&client, &inv.args),
        "list" => tasks::cmd_list(&client, cfg, renderer, &inv.args).await,
        "search" => tasks::cmd_search(&client, cfg, renderer, &inv.args).await,
        "add" => tasks::cmd_add(&client, cfg, &inv.args).await,
        "modify" => tasks::cmd_modify(&client, cfg, &inv.args).await,
        "delete" => tasks::cmd_delete(&client, cfg, &inv.args).await,
        "info" => tasks::cmd_info(&client, cfg, renderer, &inv.args).await,
        "dashboard" => dashboard::cmd_dashboard(Arc::clone(&client), cfg, renderer).await,
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Filter/paging defaults from configuration; command modifiers refine them.
pub(crate) fn base_query(cfg: &Config) -> anyhow::Result<TaskQuery> {
    let mut query = TaskQuery::default();
    if let Some(size) = cfg.get_u32("page.size")? {
        query.size = size;
    }
    if let Some(sort_by) = cfg.get("sort.by") {
        query.sort_by = sort_by;
    }
    Ok(query)
}

const MOD_KEYS: [&str; 7] = ["page", "size", "sort", "status", "priority", "due", "desc"];

/// Split args into plain words and `key:value` modifiers, the way filters
/// and mods are written on the command line. Only known modifier keys are
/// treated as such, so titles containing colons survive intact.
pub(crate) fn split_words_and_mods(args: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut words = Vec::new();
    let mut mods = Vec::new();

    for arg in args {
        if let Some((key, value)) = arg.split_once(':')
            && MOD_KEYS.contains(&key)
        {
            mods.push((key.to_string(), value.to_string()));
        } else {
            words.push(arg.clone());
        }
    }

    (words, mods)
}

/// Apply query modifiers: `page:N size:N sort:COL status:X priority:X`.
pub(crate) fn apply_query_mods(
    query: &mut TaskQuery,
    mods: &[(String, String)],
) -> anyhow::Result<()> {
    for (key, value) in mods {
        match key.as_str() {
            "page" => query.page = value.parse()?,
            "size" => query.size = value.parse()?,
            "sort" => {
                if !TaskQuery::is_sortable(value) {
                    return Err(anyhow!(
                        "unsortable column: {value} (expected one of {})",
                        crate::query::SORTABLE_COLUMNS.join(", ")
                    ));
                }
                query.sort_by = value.clone();
            }
            "status" => {
                query.status = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|err| anyhow!("{err}"))?)
                };
            }
            "priority" => {
                query.priority = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|err| anyhow!("{err}"))?)
                };
            }
            other => return Err(anyhow!("unknown filter modifier: {other}")),
        }
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: taskdeck [global flags] <command> [args]");
    println!();
    println!("auth:");
    println!("  register FIRST LAST EMAIL PASSWORD   create an account and sign in");
    println!("  login EMAIL PASSWORD                 sign in");
    println!("  logout                               invalidate the refresh token");
    println!("  whoami                               show the stored user");
    println!("  theme [light|dark]                   show or set the display theme");
    println!();
    println!("tasks:");
    println!("  list [page:N] [size:N] [sort:COL] [status:X] [priority:X]");
    println!("  search TEXT... [page:N] [sort:COL]");
    println!("  add TITLE... due:YYYY-MM-DD [priority:X] [desc:TEXT]");
    println!("  modify ID [TITLE...] [due:..] [priority:..] [status:..] [desc:..]");
    println!("  delete ID");
    println!("  info ID");
    println!("  dashboard                            interactive table with live search");
    Ok(())
}
