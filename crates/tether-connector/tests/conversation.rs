//! End-to-end behavior of connectors talking over an in-memory network.

mod common;

use common::{eventually, pair, Cluster, Node};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tether_connector::{
    CloseReason, ConnectorConfig, ConnectorError, ConnectorState, Direction, SessionError,
};
use tether_identity::{Keypair, Peer};
use tether_protocol::{Frame, Request};
use tether_repo::{Remote, Repository};
use tether_transport::{DialError, Layer, MemoryNetwork};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn alice_and_bob_query_each_other() {
    let cluster = Cluster::new(&["alice", "bob"]);
    cluster.befriend_all();

    cluster
        .run(|index, nodes| async move {
            let me = &nodes[index];
            let other = &nodes[1 - index];

            let session = me.connector.dial(&other.peer()).await.unwrap();
            assert_eq!(session.remote().id, other.peer().id);
            assert_eq!(session.direction(), Direction::Outbound);

            for _ in 0..10 {
                let version = session.query_store_version().await.unwrap();
                assert!(version > 0);
            }
            session.close().await.unwrap();
        })
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_connectors_start_and_stop_together() {
    let names = ["alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi"];
    let cluster = Cluster::new(&names);
    cluster.befriend_all();

    cluster
        .run(|index, nodes| async move {
            let me = &nodes[index];
            for (other_index, other) in nodes.iter().enumerate() {
                if other_index == index {
                    continue;
                }
                let session = me.connector.dial(&other.peer()).await.unwrap();
                assert_eq!(session.query_store_version().await.unwrap(), 1);
                session.close().await.unwrap();
            }
        })
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sessions_left_open_are_revoked_at_teardown() {
    let cluster = Cluster::new(&["alice", "bob", "carol"]);
    cluster.befriend_all();

    cluster
        .run(|index, nodes| async move {
            let me = &nodes[index];
            let next = &nodes[(index + 1) % nodes.len()];
            let session = me.connector.dial(&next.peer()).await.unwrap();
            assert!(session.ping().await.is_ok());
            // Deliberately not closed: disconnect must take care of it.
        })
        .await;
}

#[tokio::test]
async fn dialing_untrusted_peer_is_unauthorized_without_io() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", ConnectorConfig::default());
    let bob = Node::new(&network, "bob", ConnectorConfig::default());
    bob.trust(&alice);
    alice.connector.connect().await.unwrap();
    bob.connector.connect().await.unwrap();
    let mut inbound = bob.collect_inbound();

    let err = alice.connector.dial(&bob.peer()).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Unauthorized(id) if id == bob.peer().id));
    assert_eq!(alice.layer.open_channels(), 0);
    assert_eq!(bob.layer.open_channels(), 0);
    assert!(inbound.try_recv().is_err());

    alice.connector.disconnect().await.unwrap();
    bob.connector.disconnect().await.unwrap();
}

#[tokio::test]
async fn untrusted_dialer_is_refused() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", ConnectorConfig::default());
    let bob = Node::new(&network, "bob", ConnectorConfig::default());
    alice.trust(&bob);
    alice.connector.connect().await.unwrap();
    bob.connector.connect().await.unwrap();
    let mut inbound = bob.collect_inbound();

    let err = alice.connector.dial(&bob.peer()).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Dial(DialError::Refused(_))));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(inbound.try_recv().is_err());
    assert_eq!(bob.connector.session_count(), 0);
    eventually(|| alice.layer.open_channels() == 0 && bob.layer.open_channels() == 0).await;
}

#[tokio::test]
async fn inbound_sessions_reach_the_handler_and_serve_both_ways() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    let mut inbound = bob.collect_inbound();
    alice.repo.bump_store_version();

    let outbound = alice.connector.dial(&bob.peer()).await.unwrap();
    let accepted = inbound.recv().await.unwrap();

    assert_eq!(accepted.remote().id, alice.peer().id);
    assert_eq!(accepted.direction(), Direction::Inbound);
    assert_eq!(accepted.query_store_version().await.unwrap(), 2);
    assert_eq!(outbound.query_store_version().await.unwrap(), 1);

    alice.connector.disconnect().await.unwrap();
    assert_eq!(accepted.closed().await, CloseReason::Remote);
    bob.connector.disconnect().await.unwrap();
}

#[tokio::test]
async fn connect_twice_is_a_state_conflict() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", ConnectorConfig::default());

    alice.connector.connect().await.unwrap();
    let err = alice.connector.connect().await.unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::StateConflict {
            operation: "connect",
            state: ConnectorState::Connected,
        }
    ));
    assert_eq!(alice.connector.state(), ConnectorState::Connected);
}

#[tokio::test]
async fn operations_require_a_connected_connector() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", ConnectorConfig::default());
    let bob = Node::new(&network, "bob", ConnectorConfig::default());
    alice.trust(&bob);

    assert!(matches!(
        alice.connector.disconnect().await,
        Err(ConnectorError::StateConflict { .. })
    ));
    assert!(matches!(
        alice.connector.dial(&bob.peer()).await,
        Err(ConnectorError::StateConflict {
            state: ConnectorState::Disconnected,
            ..
        })
    ));
}

#[tokio::test]
async fn failed_connect_is_retryable() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", ConnectorConfig::default());
    // Another layer already holds alice's address.
    let squatter = network.layer(Keypair::generate(), alice.peer());
    squatter.online().await.unwrap();

    let err = alice.connector.connect().await.unwrap_err();
    assert!(matches!(err, ConnectorError::Transport(_)));
    assert_eq!(alice.connector.state(), ConnectorState::Disconnected);

    squatter.offline().await.unwrap();
    alice.connector.connect().await.unwrap();
    assert_eq!(alice.connector.state(), ConnectorState::Connected);
}

#[tokio::test]
async fn connector_can_reconnect() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;

    alice.connector.disconnect().await.unwrap();
    assert_eq!(alice.connector.state(), ConnectorState::Disconnected);
    alice.connector.connect().await.unwrap();

    let session = alice.connector.dial(&bob.peer()).await.unwrap();
    assert!(session.query_store_version().await.is_ok());
}

#[tokio::test]
async fn disconnect_revokes_open_sessions() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    let bob_peer = bob.peer();
    let sessions = join_all((0..3).map(|_| alice.connector.dial(&bob_peer))).await;
    let sessions: Vec<_> = sessions.into_iter().map(Result::unwrap).collect();
    assert_eq!(alice.connector.session_count(), 3);

    alice.connector.disconnect().await.unwrap();

    assert_eq!(alice.connector.session_count(), 0);
    assert_eq!(alice.layer.open_channels(), 0);
    for session in &sessions {
        assert!(!session.is_open());
        assert_eq!(session.close_reason(), Some(CloseReason::Revoked));
        assert_eq!(
            session.query_store_version().await,
            Err(SessionError::Closed(CloseReason::Revoked))
        );
    }
    eventually(|| bob.connector.session_count() == 0).await;
}

#[tokio::test]
async fn disconnect_lets_sessions_drain() {
    let config = ConnectorConfig::default().with_drain_timeout(Duration::from_secs(5));
    let (alice, bob) = pair(config).await;
    let session = alice.connector.dial(&bob.peer()).await.unwrap();

    let closer = {
        let session = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.close().await.unwrap();
        })
    };
    alice.connector.disconnect().await.unwrap();
    closer.await.unwrap();

    assert_eq!(session.close_reason(), Some(CloseReason::Local));
}

#[tokio::test]
async fn layer_going_offline_closes_sessions() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    let session = alice.connector.dial(&bob.peer()).await.unwrap();

    alice.layer.offline().await.unwrap();

    assert_eq!(session.closed().await, CloseReason::TransportOffline);
    assert_eq!(
        session.query_store_version().await,
        Err(SessionError::Closed(CloseReason::TransportOffline))
    );
    assert_eq!(alice.connector.session_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dial_racing_disconnect_never_leaks_a_session() {
    for round in 0..20 {
        let (alice, bob) = pair(ConnectorConfig::default()).await;
        let target = bob.peer();

        // The dial is polled first, so it always starts while connected.
        let dial = alice.connector.dial(&target);
        let disconnect = async {
            for _ in 0..round % 5 {
                tokio::task::yield_now().await;
            }
            alice.connector.disconnect().await
        };
        let (dialed, disconnected) = tokio::join!(dial, disconnect);
        disconnected.unwrap();

        match dialed {
            Ok(session) => assert!(!session.is_open()),
            Err(ConnectorError::Disconnecting) => {}
            Err(other) => panic!("unexpected dial outcome: {other}"),
        }
        assert_eq!(alice.connector.session_count(), 0);
        bob.connector.disconnect().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnect_returns_while_remote_stops_reading() {
    let network = MemoryNetwork::new();
    let alice = Node::new(&network, "alice", ConnectorConfig::default());
    let mallory_key = Keypair::generate();
    let mallory = Peer::new(mallory_key.peer_id(), "mallory", "mem://mallory");
    alice
        .repo
        .remotes()
        .insert(Remote::from_peer(mallory.clone()))
        .unwrap();
    alice.connector.connect().await.unwrap();
    let mallory_layer = network.layer(mallory_key, mallory);
    mallory_layer.online().await.unwrap();

    // Mallory asks for far more answers than fit in the pipe and never reads.
    let mut channel = mallory_layer.dial(&alice.peer()).await.unwrap();
    assert_eq!(channel.recv().await.unwrap(), Frame::Admit);
    for id in 1..=3_000 {
        let request = Frame::Request {
            id,
            request: Request::StoreVersion,
        };
        channel.send(request).await.unwrap();
    }
    eventually(|| alice.connector.session_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(5), alice.connector.disconnect())
        .await
        .expect("disconnect hung on a blocked session")
        .unwrap();
    assert_eq!(alice.connector.session_count(), 0);
    assert_eq!(alice.layer.open_channels(), 0);
    assert!(!alice.layer.is_online());
    drop(channel);
}

#[tokio::test]
async fn cancelled_dial_returns_promptly() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = alice.connector.dial_with(&bob.peer(), &cancel).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Cancelled));
    eventually(|| alice.layer.open_channels() == 0).await;
}

#[tokio::test]
async fn cancelled_request_leaves_session_usable() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    let session = alice.connector.dial(&bob.peer()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(
        session.query_store_version_with(&cancel).await,
        Err(SessionError::Cancelled)
    );
    assert_eq!(session.query_store_version().await, Ok(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_correlated() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    for _ in 0..4 {
        bob.repo.bump_store_version();
    }
    let session = alice.connector.dial(&bob.peer()).await.unwrap();

    let queries = (0..32).map(|i| {
        let session = session.clone();
        async move {
            if i % 2 == 0 {
                session.query_store_version().await.map(Some)
            } else {
                session.ping().await.map(|_| None)
            }
        }
    });
    for outcome in join_all(queries).await {
        match outcome.unwrap() {
            Some(version) => assert_eq!(version, 5),
            None => {}
        }
    }
}

#[tokio::test]
async fn unreachable_remote_is_a_dial_error() {
    let (alice, _bob) = pair(ConnectorConfig::default()).await;
    let ghost = Peer::new(Keypair::generate().peer_id(), "ghost", "mem://ghost");
    alice
        .repo
        .remotes()
        .insert(Remote::from_peer(ghost.clone()))
        .unwrap();

    let err = alice.connector.dial(&ghost).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Dial(DialError::Unreachable(_))));
    assert_eq!(alice.connector.state(), ConnectorState::Connected);
}

#[tokio::test]
async fn removing_a_remote_revokes_future_dials_only() {
    let (alice, bob) = pair(ConnectorConfig::default()).await;
    let session = alice.connector.dial(&bob.peer()).await.unwrap();

    assert!(alice.repo.remotes().remove(&bob.peer().id));
    assert!(matches!(
        alice.connector.dial(&bob.peer()).await,
        Err(ConnectorError::Unauthorized(_))
    ));
    assert!(session.ping().await.is_ok());
}
