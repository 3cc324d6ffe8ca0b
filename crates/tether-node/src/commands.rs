//! CLI command implementations.

use crate::config::NodeConfig;
use anyhow::{bail, Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tether_connector::{Connector, Session};
use tether_identity::{Peer, PeerId};
use tether_repo::{FsRepository, Remote, Repository};
use tether_transport::TcpLayer;
use tracing::{info, warn};

/// Initialize a repository in `folder`.
pub fn init(folder: &Path, name: &str, addr: &str) -> Result<()> {
    let repo = FsRepository::init(folder, name, addr)
        .with_context(|| format!("cannot initialize {}", folder.display()))?;

    println!("Initialized Tether repository in {}", repo.path().display());
    println!("  Peer ID: {}", repo.peer().id.to_hex());
    Ok(())
}

/// Show the local identity.
pub fn whoami(folder: &Path) -> Result<()> {
    let repo = open(folder)?;
    let peer = repo.peer();

    println!("Name:          {}", peer.name);
    println!("Peer ID:       {}", peer.id.to_hex());
    println!("Address:       {}", peer.addr);
    println!("Store version: {}", repo.store_version());
    println!("Remotes:       {}", repo.remotes().len());
    Ok(())
}

/// Trust a peer.
pub fn remote_add(
    folder: &Path,
    id: &str,
    name: &str,
    addr: &str,
    display_name: Option<&str>,
) -> Result<()> {
    let repo = open(folder)?;
    let id: PeerId = id.parse().context("invalid peer id")?;
    if id == repo.peer().id {
        bail!("a node cannot trust itself");
    }

    let mut remote = Remote::from_peer(Peer::new(id, name, addr));
    if let Some(display_name) = display_name {
        remote = remote.with_display_name(display_name);
    }
    repo.add_remote(remote)?;

    println!("Trusted {name} ({})", id.short_id());
    Ok(())
}

/// Stop trusting a peer, given by name or hex id.
pub fn remote_rm(folder: &Path, peer: &str) -> Result<()> {
    let repo = open(folder)?;
    let remote = resolve(&repo, peer)?;
    repo.remove_remote(&remote.id())?;

    println!("Removed {} ({})", remote.peer.name, remote.id().short_id());
    Ok(())
}

/// List trusted peers.
pub fn remote_list(folder: &Path) -> Result<()> {
    let repo = open(folder)?;
    let remotes = repo.remotes().list();
    if remotes.is_empty() {
        println!("No remotes. Use 'tether remote add' to trust a peer.");
        return Ok(());
    }

    println!("{:<16}  {:<24}  {:<22}  DISPLAY NAME", "PEER", "NAME", "ADDRESS");
    for remote in remotes {
        println!(
            "{:<16}  {:<24}  {:<22}  {}",
            remote.id().short_id(),
            remote.peer.name,
            remote.peer.addr,
            remote.display_name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Go online and serve trusted peers until `shutdown` resolves.
pub async fn serve(
    folder: &Path,
    config: &NodeConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let repo = Arc::new(open(folder)?);
    let tcp = config.tcp_config(&repo.peer())?;
    let layer = Arc::new(TcpLayer::new(repo.keypair().clone(), repo.peer(), tcp));
    let connector = Connector::new(layer.clone(), repo.clone(), config.connector_config())?
        .with_inbound_handler(watch_session);

    connector.connect().await?;
    info!(
        peer = %repo.peer().id,
        addr = ?layer.local_addr(),
        remotes = repo.remotes().len(),
        "Serving"
    );

    shutdown.await;

    info!(sessions = connector.session_count(), "Shutting down");
    connector.disconnect().await?;
    Ok(())
}

/// Logs the lifetime of an inbound session.
fn watch_session(session: Session) {
    info!(session = session.id(), peer = %session.remote().id, name = %session.remote().name, "Peer connected");
    tokio::spawn(async move {
        let reason = session.closed().await;
        info!(session = session.id(), peer = %session.remote().id, %reason, "Peer disconnected");
    });
}

/// Query a trusted remote's store version `count` times.
///
/// Returns the versions received, in order.
pub async fn query(folder: &Path, config: &NodeConfig, peer: &str, count: u32) -> Result<Vec<u64>> {
    let repo = Arc::new(open(folder)?);
    let remote = resolve(&repo, peer)?;

    // an ephemeral port keeps queries from clashing with a running `serve`
    let mut tcp = config.tcp_config(&repo.peer())?;
    tcp.listen_addr = SocketAddr::new(tcp.listen_addr.ip(), 0);
    tcp.advertise_addr = None;
    let layer = Arc::new(TcpLayer::new(repo.keypair().clone(), repo.peer(), tcp));
    let connector = Connector::new(layer, repo.clone(), config.connector_config())?;

    connector.connect().await?;
    let result = exchange(&connector, &remote.peer, count).await;
    if let Err(e) = connector.disconnect().await {
        warn!(error = %e, "Disconnect failed");
    }
    result
}

async fn exchange(connector: &Connector, peer: &Peer, count: u32) -> Result<Vec<u64>> {
    let session = connector
        .dial(peer)
        .await
        .with_context(|| format!("cannot reach {}", peer.name))?;

    let latency = session.ping().await?;
    println!("Connected to {} ({}) in {latency:?}", peer.name, peer.id.short_id());

    let mut versions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let version = session.query_store_version().await?;
        println!("{}: store version {version}", peer.name);
        versions.push(version);
    }

    session.close().await?;
    Ok(versions)
}

fn open(folder: &Path) -> Result<FsRepository> {
    FsRepository::open(folder).with_context(|| {
        format!(
            "no repository in {} (run 'tether init' first)",
            folder.display()
        )
    })
}

/// Finds a remote by name, display name, or hex peer id.
fn resolve(repo: &FsRepository, peer: &str) -> Result<Remote> {
    let remotes = repo.remotes();
    if let Some(remote) = remotes.find_by_name(peer) {
        return Ok(remote);
    }
    if let Ok(id) = peer.parse::<PeerId>() {
        if let Some(remote) = remotes.get(&id) {
            return Ok(remote);
        }
    }
    bail!("unknown remote '{peer}'")
}
