pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod debounce;
pub mod error;
pub mod protocol;
pub mod query;
pub mod render;
pub mod session;
pub mod store;
pub mod task;
pub mod validate;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        "starting taskdeck CLI"
    );
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rc_file.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let storage = session::FileStorage::open(&data_dir)
        .with_context(|| format!("failed to open session storage at {}", data_dir.display()))?;
    let sessions = Arc::new(session::SessionStore::open(Box::new(storage)));

    let server_url = cfg
        .get("server.url")
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let client = Arc::new(
        client::ApiClient::new(&server_url, Arc::clone(&sessions))
            .with_context(|| format!("invalid server url {server_url}"))?,
    );

    let mut renderer = render::Renderer::new(&cfg, sessions.theme())?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(commands::dispatch(client, &cfg, &mut renderer, inv))?;

    info!("done");
    Ok(())
}
