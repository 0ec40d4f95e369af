// Copyright (c) 2024 Omerta Mesh Contributors

//! End-to-end exercise of two live `MeshNode`s on loopback, covering the
//! public surface from identity through channel delivery.

use mesh_crypto::NetworkKey;
use mesh_identity::Identity;
use mesh_node::{MeshConfigBuilder, MeshNodeBuilder};

#[tokio::test]
async fn two_public_nodes_exchange_a_channel_message_directly() {
    let (identity_a, _) = Identity::generate();
    let (identity_b, _) = Identity::generate();
    let network_key = NetworkKey::from_bytes([0x42u8; 32]);

    let peer_id_a = identity_a.peer_id();
    let peer_id_b = identity_b.peer_id();

    let addr_a: std::net::SocketAddr = "127.0.0.1:19801".parse().unwrap();
    let addr_b: std::net::SocketAddr = "127.0.0.1:19802".parse().unwrap();

    let node_a = MeshNodeBuilder::new(
        identity_a,
        network_key,
        MeshConfigBuilder::new().bind_addr(addr_a).build(),
    )
    .build();
    let node_b = MeshNodeBuilder::new(
        identity_b,
        network_key,
        MeshConfigBuilder::new().bind_addr(addr_b).build(),
    )
    .build();

    node_a.start().await.unwrap();
    node_b.start().await.unwrap();

    node_a.add_peer(peer_id_b, addr_b.into()).unwrap();
    node_b.add_peer(peer_id_a, addr_a.into()).unwrap();

    let mut rx = node_b.on_channel("x").unwrap();
    node_a.send_on_channel(b"hello".to_vec(), peer_id_b, "x").await.unwrap();

    let message = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.from_peer_id, peer_id_a);
    assert_eq!(message.bytes, b"hello");

    node_a.stop().await.unwrap();
    node_b.stop().await.unwrap();
}
