//! podlink - per-container IPv6 attachment plugin
//!
//! Allocates an address pair from a parent block for each container and
//! connects the container's network namespace to the host over a veth pair.
//! Speaks the CNI calling convention: parameters come from the environment
//! and stdin, the report goes to stdout as JSON.

mod cli;
mod cni;
mod error;
mod manifest;
mod network;

use clap::Parser;
use clap::error::ErrorKind;
use cli::{Cli, CniCommand};
use error::{Error, Result};
use network::{AddressPool, AttachmentManager};
use serde::Serialize;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = emit(&cni::ErrorResponse::new(4, e.to_string().trim()));
            std::process::exit(1);
        }
    };

    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        tracing::error!(command = ?cli.command, error = %e, "command failed");
        let _ = emit(&cni::ErrorResponse::from(&e));
        std::process::exit(1);
    }
}

/// Log to stderr; stdout carries the JSON report
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    match cli.command {
        CniCommand::Version => emit(&cni::VersionResponse::default()),
        CniCommand::Add => add(cli),
        CniCommand::Del => del(cli),
        CniCommand::Check => check(cli),
    }
}

fn add(cli: &Cli) -> Result<()> {
    let container_id = require(&cli.container_id, "CNI_CONTAINERID")?;
    let ifname = require(&cli.ifname, "CNI_IFNAME")?;
    let netns = require(&cli.netns, "CNI_NETNS")?;

    let request = cni::AddRequest::read(io::stdin().lock())?;
    let parent = request.parent()?;

    let config = manifest::load(&cli.config)?;
    let identity = config.naming().identity(container_id, ifname, netns)?;
    let control = config.control();

    let pool = AddressPool::new(parent, request.target_net)?;
    let pair = pool.pick_pair(&control)?;
    let state = AttachmentManager::new(&control).setup(&identity, pair)?;

    emit(&cni::AddResponse::from(&state))
}

fn del(cli: &Cli) -> Result<()> {
    let container_id = require(&cli.container_id, "CNI_CONTAINERID")?;
    let config = manifest::load_or_default(&cli.config);

    // An invalid ID never had anything set up for it
    match config.naming().host_link_name(container_id) {
        Ok(host_link) => AttachmentManager::new(&config.control()).teardown(container_id, &host_link),
        Err(e) => tracing::warn!(error = %e, "nothing to tear down"),
    }
    Ok(())
}

fn check(cli: &Cli) -> Result<()> {
    let container_id = require(&cli.container_id, "CNI_CONTAINERID")?;
    let ifname = require(&cli.ifname, "CNI_IFNAME")?;
    let netns = require(&cli.netns, "CNI_NETNS")?;

    let config = manifest::load(&cli.config)?;
    let identity = config.naming().identity(container_id, ifname, netns)?;
    AttachmentManager::new(&config.control()).check(&identity)
}

fn require<'a, T>(value: &'a Option<T>, variable: &str) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| Error::InvalidRequest(format!("{} is not set", variable)))
}

/// Write one JSON document to stdout
fn emit<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
