// Copyright (c) 2024 Omerta Mesh Contributors

//! NAT classification: the actor that runs probes against the configured
//! rendezvous servers, and the pure comparison function that turns their
//! replies into a [`NatType`].

use crate::config::NatConfig;
use crate::error::{NatError, Result};
use crate::protocol::{ProbeRequest, ProbeResponse};
use mesh_common::NatType;
use mesh_net::{Datagram, TransportHandle};
use rand_free_transaction_id::next_transaction_id;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

mod rand_free_transaction_id {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// A transaction id unique enough to correlate replies without pulling
    /// in a dependency on `rand` for 12 bytes of correlation data: the
    /// current time plus a process-local counter.
    pub fn next_transaction_id() -> [u8; 12] {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut id = [0u8; 12];
        id[..8].copy_from_slice(&nanos.to_le_bytes());
        id[8..].copy_from_slice(&count.to_le_bytes()[..4]);
        id
    }
}

/// Outcome of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatObservation {
    pub nat_type: NatType,
    pub public_endpoint: Option<SocketAddr>,
}

/// Compare the four mapped-endpoint replies from two rendezvous servers
/// (two replies each) and classify the NAT, per §4.3.
///
/// `saw_unsolicited_probe` reflects whether a probe arrived from a third,
/// uninvited address during the post-probe window; it's what distinguishes
/// `full-cone` from the more conservative `restricted-cone`/`port-restricted`
/// defaults. `change_port_probe_succeeded` reflects whether a reply sent
/// from the same server IP but a different source port still got through;
/// that's what further distinguishes `restricted-cone` (any port from the
/// mapped IP passes) from `port-restricted` (only the exact mapped port
/// does).
pub fn classify(
    local_ip: IpAddr,
    server_a: (SocketAddr, SocketAddr),
    server_b: (SocketAddr, SocketAddr),
    saw_unsolicited_probe: bool,
    change_port_probe_succeeded: bool,
) -> NatType {
    let all_identical =
        server_a.0 == server_a.1 && server_a.0 == server_b.0 && server_a.0 == server_b.1;

    if all_identical {
        if server_a.0.ip() == local_ip {
            return NatType::Public;
        }
        if saw_unsolicited_probe {
            return NatType::FullCone;
        }
        return if change_port_probe_succeeded {
            NatType::RestrictedCone
        } else {
            NatType::PortRestricted
        };
    }

    if server_a.0 != server_b.0 {
        // Different mapping per destination server: symmetric.
        return NatType::Symmetric;
    }

    NatType::Unknown
}

enum Command {
    Detect(oneshot::Sender<Result<NatObservation>>),
    /// Forwarded by `mesh-node` when an inbound datagram's bytes don't
    /// parse as a probe response addressed to an in-flight transaction;
    /// used to detect the full-cone unsolicited-probe signal.
    UnsolicitedProbe(SocketAddr),
    LastObservation(oneshot::Sender<Option<NatObservation>>),
}

/// Handle to the running NAT detector task.
#[derive(Clone)]
pub struct NatHandle {
    commands: mpsc::Sender<Command>,
}

impl NatHandle {
    /// Run one full detection cycle. Safe to call repeatedly (e.g. on an
    /// `endpoint_report` hint from a peer); detection never blocks other
    /// I/O because it only ever talks over the shared transport's queue.
    pub async fn detect(&self) -> Result<NatObservation> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Detect(tx))
            .await
            .map_err(|_| NatError::Closed)?;
        rx.await.map_err(|_| NatError::Closed)?
    }

    /// Notify the detector that a datagram arrived from an address that
    /// wasn't one of the rendezvous servers, while a detection was
    /// recently in flight.
    pub async fn notify_unsolicited_probe(&self, from: SocketAddr) {
        let _ = self.commands.send(Command::UnsolicitedProbe(from)).await;
    }

    pub async fn last_observation(&self) -> Option<NatObservation> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::LastObservation(tx)).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }
}

/// Spawn the NAT detector task, returning a handle and a receiver the
/// transport layer should forward rendezvous-server datagrams into.
pub fn spawn(config: NatConfig, transport: TransportHandle) -> (NatHandle, mpsc::Sender<Datagram>) {
    let (command_tx, command_rx) = mpsc::channel(8);
    let (rendezvous_tx, rendezvous_rx) = mpsc::channel(32);
    tokio::spawn(run(config, transport, command_rx, rendezvous_rx));
    (NatHandle { commands: command_tx }, rendezvous_tx)
}

async fn run(
    config: NatConfig,
    transport: TransportHandle,
    mut commands: mpsc::Receiver<Command>,
    mut rendezvous_datagrams: mpsc::Receiver<Datagram>,
) {
    let mut last_observation: Option<NatObservation> = None;
    let mut unsolicited_seen = false;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { return };
                match command {
                    Command::Detect(reply) => {
                        unsolicited_seen = false;
                        let result = run_detection(&config, &transport, &mut rendezvous_datagrams, &mut unsolicited_seen).await;
                        if let Ok(observation) = &result {
                            last_observation = Some(*observation);
                            info!(?observation, "NAT detection complete");
                        }
                        let _ = reply.send(result);
                    }
                    Command::UnsolicitedProbe(from) => {
                        debug!(%from, "unsolicited probe observed");
                        unsolicited_seen = true;
                    }
                    Command::LastObservation(reply) => {
                        let _ = reply.send(last_observation);
                    }
                }
            }
            datagram = rendezvous_datagrams.recv() => {
                if datagram.is_none() {
                    return;
                }
                // Stray datagrams arriving outside an active detection call
                // are treated as candidate unsolicited probes.
                unsolicited_seen = true;
            }
        }
    }
}

async fn run_detection(
    config: &NatConfig,
    transport: &TransportHandle,
    rendezvous_datagrams: &mut mpsc::Receiver<Datagram>,
    unsolicited_seen: &mut bool,
) -> Result<NatObservation> {
    if config.rendezvous_servers.len() < 2 {
        return Err(NatError::NotEnoughRendezvousServers(
            config.rendezvous_servers.len(),
        ));
    }
    let server_a = config.rendezvous_servers[0];
    let server_b = config.rendezvous_servers[1];

    let a1 = probe_once(transport, rendezvous_datagrams, server_a, config.probe_timeout).await?;
    let a2 = probe_once(transport, rendezvous_datagrams, server_a, config.probe_timeout).await?;
    let b1 = probe_once(transport, rendezvous_datagrams, server_b, config.probe_timeout).await?;
    let b2 = probe_once(transport, rendezvous_datagrams, server_b, config.probe_timeout).await?;

    tokio::time::sleep(config.unsolicited_probe_window).await;
    // Drain any unsolicited probes that arrived during the window.
    while let Ok(Some(_)) =
        tokio::time::timeout(Duration::from_millis(1), rendezvous_datagrams.recv()).await
    {
        *unsolicited_seen = true;
    }

    let change_port_probe_succeeded =
        probe_change_port(transport, rendezvous_datagrams, server_a, config.probe_timeout).await;

    let local_ip = transport.local_addr().ip();
    let nat_type = classify(
        local_ip,
        (a1.mapped_endpoint, a2.mapped_endpoint),
        (b1.mapped_endpoint, b2.mapped_endpoint),
        *unsolicited_seen,
        change_port_probe_succeeded,
    );

    Ok(NatObservation {
        nat_type,
        public_endpoint: Some(a2.mapped_endpoint),
    })
}

async fn probe_once(
    transport: &TransportHandle,
    rendezvous_datagrams: &mut mpsc::Receiver<Datagram>,
    server: SocketAddr,
    timeout: Duration,
) -> Result<ProbeResponse> {
    let transaction_id = next_transaction_id();
    let request = ProbeRequest { transaction_id, change_port: false };

    transport
        .send_to(server, request.encode())
        .await
        .map_err(|_| NatError::AllServersUnreachable)?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(NatError::AllServersUnreachable);
        }
        match tokio::time::timeout(remaining, rendezvous_datagrams.recv()).await {
            Ok(Some(datagram)) => {
                let Some(response) = ProbeResponse::decode(&datagram.bytes) else {
                    continue;
                };
                if response.transaction_id == transaction_id {
                    return Ok(response);
                }
            }
            Ok(None) => return Err(NatError::Closed),
            Err(_) => return Err(NatError::AllServersUnreachable),
        }
    }
}

/// Ask `server` to send its reply from a different source port on the
/// same IP (a STUN-style CHANGE-REQUEST), and report whether it got
/// through. Never fails outright: a timeout or send error just means the
/// probe didn't get through, which is itself the `port-restricted` signal.
async fn probe_change_port(
    transport: &TransportHandle,
    rendezvous_datagrams: &mut mpsc::Receiver<Datagram>,
    server: SocketAddr,
    timeout: Duration,
) -> bool {
    let transaction_id = next_transaction_id();
    let request = ProbeRequest { transaction_id, change_port: true };

    if transport.send_to(server, request.encode()).await.is_err() {
        return false;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match tokio::time::timeout(remaining, rendezvous_datagrams.recv()).await {
            Ok(Some(datagram)) => {
                let Some(response) = ProbeResponse::decode(&datagram.bytes) else {
                    continue;
                };
                if response.transaction_id == transaction_id && datagram.from.ip() == server.ip() {
                    return true;
                }
            }
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn four_identical_mapped_to_local_ip_is_public() {
        let local = "198.51.100.7".parse().unwrap();
        let endpoint = ep("198.51.100.7:40000");
        let nat = classify(local, (endpoint, endpoint), (endpoint, endpoint), false, false);
        assert_eq!(nat, NatType::Public);
    }

    #[test]
    fn four_identical_but_different_from_local_and_no_change_port_is_port_restricted() {
        let local = "10.0.0.5".parse().unwrap();
        let endpoint = ep("198.51.100.7:40000");
        let nat = classify(local, (endpoint, endpoint), (endpoint, endpoint), false, false);
        assert_eq!(nat, NatType::PortRestricted);
    }

    #[test]
    fn four_identical_and_change_port_probe_succeeds_is_restricted_cone() {
        let local = "10.0.0.5".parse().unwrap();
        let endpoint = ep("198.51.100.7:40000");
        let nat = classify(local, (endpoint, endpoint), (endpoint, endpoint), false, true);
        assert_eq!(nat, NatType::RestrictedCone);
    }

    #[test]
    fn unsolicited_probe_upgrades_to_full_cone_even_if_change_port_probe_failed() {
        let local = "10.0.0.5".parse().unwrap();
        let endpoint = ep("198.51.100.7:40000");
        let nat = classify(local, (endpoint, endpoint), (endpoint, endpoint), true, false);
        assert_eq!(nat, NatType::FullCone);
    }

    #[test]
    fn differing_mapped_ip_per_server_is_symmetric() {
        let local = "10.0.0.5".parse().unwrap();
        let mapped_a = ep("198.51.100.7:40000");
        let mapped_b = ep("198.51.100.7:40123");
        let nat = classify(local, (mapped_a, mapped_a), (mapped_b, mapped_b), false, false);
        assert_eq!(nat, NatType::Symmetric);
    }

    #[test]
    fn inconsistent_replies_within_one_server_are_unknown() {
        let local = "10.0.0.5".parse().unwrap();
        let mapped_a1 = ep("198.51.100.7:40000");
        let mapped_a2 = ep("198.51.100.7:40001");
        let mapped_b = ep("198.51.100.7:40000");
        let nat = classify(local, (mapped_a1, mapped_a2), (mapped_b, mapped_b), false, false);
        assert_eq!(nat, NatType::Unknown);
    }
}
