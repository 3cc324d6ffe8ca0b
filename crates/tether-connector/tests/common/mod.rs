//! Shared harness for connector integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tether_connector::{Connector, ConnectorConfig, Session};
use tether_identity::{Keypair, Peer};
use tether_repo::{MemoryRepository, Remote, Repository};
use tether_transport::{Layer, MemoryLayer, MemoryNetwork};
use tokio::sync::{mpsc, Barrier};

/// One node of a test cluster.
pub struct Node {
    pub name: String,
    pub repo: Arc<MemoryRepository>,
    pub layer: Arc<MemoryLayer>,
    pub connector: Connector,
}

impl Node {
    pub fn new(network: &MemoryNetwork, name: &str, config: ConnectorConfig) -> Self {
        let keypair = Keypair::generate();
        let repo = Arc::new(MemoryRepository::with_keypair(
            keypair.clone(),
            name,
            format!("mem://{name}"),
        ));
        let layer = Arc::new(network.layer(keypair, repo.peer()));
        let connector = Connector::new(layer.clone(), repo.clone(), config).unwrap();
        Self {
            name: name.to_string(),
            repo,
            layer,
            connector,
        }
    }

    pub fn peer(&self) -> Peer {
        self.repo.peer()
    }

    /// Adds `other` to this node's remotes.
    pub fn trust(&self, other: &Node) {
        self.repo
            .remotes()
            .insert(Remote::from_peer(other.peer()))
            .unwrap();
    }

    /// Forwards every admitted inbound session to the returned receiver.
    pub fn collect_inbound(&self) -> mpsc::UnboundedReceiver<Session> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connector.set_inbound_handler(move |session: Session| {
            let _ = tx.send(session);
        });
        rx
    }
}

/// Two trusting nodes that are already connected.
pub async fn pair(config: ConnectorConfig) -> (Node, Node) {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", config.clone());
    let bob = Node::new(&network, "bob", config);
    alice.trust(&bob);
    bob.trust(&alice);
    alice.connector.connect().await.unwrap();
    bob.connector.connect().await.unwrap();
    (alice, bob)
}

/// A set of nodes sharing one in-memory network.
pub struct Cluster {
    pub nodes: Arc<Vec<Node>>,
}

impl Cluster {
    pub fn new(names: &[&str]) -> Self {
        let network = MemoryNetwork::new();
        let nodes = names
            .iter()
            .map(|name| Node::new(&network, name, ConnectorConfig::default()))
            .collect();
        Self {
            nodes: Arc::new(nodes),
        }
    }

    /// Makes every node trust every other node.
    pub fn befriend_all(&self) {
        for a in self.nodes.iter() {
            for b in self.nodes.iter() {
                if a.peer() != b.peer() {
                    a.trust(b);
                }
            }
        }
    }

    /// Connects every node concurrently, runs `body` for each node once all
    /// are connected, then disconnects them all once every body finished.
    ///
    /// Asserts that no channel and no session is left behind.
    pub async fn run<F, Fut>(&self, body: F)
    where
        F: Fn(usize, Arc<Vec<Node>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let count = self.nodes.len();
        let setup = Arc::new(Barrier::new(count));
        let teardown = Arc::new(Barrier::new(count));
        let body = Arc::new(body);

        let tasks: Vec<_> = (0..count)
            .map(|index| {
                let nodes = Arc::clone(&self.nodes);
                let setup = Arc::clone(&setup);
                let teardown = Arc::clone(&teardown);
                let body = Arc::clone(&body);
                tokio::spawn(async move {
                    nodes[index].connector.connect().await.unwrap();
                    setup.wait().await;

                    body(index, Arc::clone(&nodes)).await;

                    teardown.wait().await;
                    nodes[index].connector.disconnect().await.unwrap();
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        for node in self.nodes.iter() {
            assert_eq!(node.connector.session_count(), 0, "{} leaked sessions", node.name);
            assert_eq!(node.layer.open_channels(), 0, "{} leaked channels", node.name);
            assert!(!node.layer.is_online());
        }
    }
}

/// Polls `condition` until it holds or a second has passed.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
