//! Two file-backed nodes talking over loopback TCP.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::Path;
use std::time::Duration;
use tether_node::commands;
use tether_node::config::NodeConfig;
use tether_repo::{FsRepository, Repository};
use tokio::sync::oneshot;

fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn node_config(port: u16) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network.listen_addr = Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    config
}

fn id_of(folder: &Path) -> String {
    FsRepository::open(folder).unwrap().peer().id.to_hex()
}

#[tokio::test(flavor = "multi_thread")]
async fn query_a_serving_node() {
    let alice = tempfile::tempdir().unwrap();
    let bob = tempfile::tempdir().unwrap();
    let port = free_port();
    let bob_addr = format!("127.0.0.1:{port}");

    commands::init(alice.path(), "alice", "127.0.0.1:0").unwrap();
    commands::init(bob.path(), "bob", &bob_addr).unwrap();
    commands::remote_add(alice.path(), &id_of(bob.path()), "bob", &bob_addr, None).unwrap();
    commands::remote_add(bob.path(), &id_of(alice.path()), "alice", "127.0.0.1:0", None).unwrap();

    // a bumped version proves the answer comes from bob's files
    FsRepository::open(bob.path())
        .unwrap()
        .bump_store_version()
        .unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let bob_path = bob.path().to_path_buf();
    let server = tokio::spawn(async move {
        commands::serve(&bob_path, &node_config(port), async {
            let _ = stopped.await;
        })
        .await
    });

    let mut versions = None;
    for _ in 0..50 {
        match commands::query(alice.path(), &node_config(0), "bob", 3).await {
            Ok(v) => {
                versions = Some(v);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert_eq!(versions.expect("bob never answered"), vec![2, 2, 2]);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn serve_listens_where_init_said() {
    let alice = tempfile::tempdir().unwrap();
    let bob = tempfile::tempdir().unwrap();
    let bob_addr = format!("127.0.0.1:{}", free_port());

    commands::init(alice.path(), "alice", "127.0.0.1:0").unwrap();
    commands::init(bob.path(), "bob", &bob_addr).unwrap();
    commands::remote_add(alice.path(), &id_of(bob.path()), "bob", &bob_addr, None).unwrap();
    commands::remote_add(bob.path(), &id_of(alice.path()), "alice", "127.0.0.1:0", None).unwrap();

    // no network settings at all: bob binds the address alice saved
    let (stop, stopped) = oneshot::channel::<()>();
    let bob_path = bob.path().to_path_buf();
    let server = tokio::spawn(async move {
        commands::serve(&bob_path, &NodeConfig::default(), async {
            let _ = stopped.await;
        })
        .await
    });

    let mut versions = None;
    for _ in 0..50 {
        match commands::query(alice.path(), &NodeConfig::default(), "bob", 1).await {
            Ok(v) => {
                versions = Some(v);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert_eq!(versions.expect("bob never answered"), vec![1]);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn untrusted_node_is_refused() {
    let alice = tempfile::tempdir().unwrap();
    let bob = tempfile::tempdir().unwrap();
    let port = free_port();
    let bob_addr = format!("127.0.0.1:{port}");

    commands::init(alice.path(), "alice", "127.0.0.1:0").unwrap();
    commands::init(bob.path(), "bob", &bob_addr).unwrap();
    commands::remote_add(alice.path(), &id_of(bob.path()), "bob", &bob_addr, None).unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let bob_path = bob.path().to_path_buf();
    let server = tokio::spawn(async move {
        commands::serve(&bob_path, &node_config(port), async {
            let _ = stopped.await;
        })
        .await
    });

    // until bob listens the socket itself refuses, so wait for bob's answer
    let mut refusal = String::new();
    for _ in 0..50 {
        let err = commands::query(alice.path(), &node_config(0), "bob", 1)
            .await
            .unwrap_err();
        refusal = format!("{err:#}");
        if refusal.contains("not a trusted remote") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refusal.contains("not a trusted remote"), "{refusal}");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
