//! UDP transport: broadcast/listen beacons on a LAN, with optional v2
//! signature verification against a trust-on-first-use key map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use beacon_codec::{decode_envelopes, verify_envelope};
use beacon_core::time::now_s;

use crate::error::{TransportError, TransportResult};

/// Datagrams larger than this are rejected by most kernels anyway; kept
/// as the receive buffer size to match UDP's practical ceiling.
pub const MAX_DATAGRAM: usize = 65507;

#[derive(Debug, Clone)]
pub struct UdpMessage {
    pub data: Vec<u8>,
    pub text: String,
    pub addr: SocketAddr,
    pub received_at: i64,
    /// `None` for unsigned (v1) or unverifiable payloads; `Some(bool)`
    /// for the first v2 envelope found in the datagram.
    pub verified: Option<bool>,
}

/// Send a single UDP datagram. `broadcast` sets `SO_BROADCAST`; `ttl`
/// overrides the default multicast/unicast hop limit when set.
pub async fn send(
    host: &str,
    port: u16,
    payload: &[u8],
    broadcast: bool,
    ttl: Option<u32>,
) -> TransportResult<()> {
    if host.is_empty() {
        return Err(TransportError::MissingHost);
    }
    if port == 0 {
        return Err(TransportError::InvalidPort);
    }

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    if let Some(ttl) = ttl {
        socket.set_ttl(ttl)?;
    }
    socket.send_to(payload, (host, port)).await?;
    Ok(())
}

/// Listen for UDP datagrams, calling `on_message` for each one received.
/// Returns once `timeout_s` elapses with no datagram, or runs forever if
/// `timeout_s` is `None`. `known_keys` is updated in place as new v2
/// envelopes verify and learn a peer's public key.
pub async fn listen<F>(
    bind_host: &str,
    port: u16,
    known_keys: &mut HashMap<String, String>,
    timeout_s: Option<Duration>,
    mut on_message: F,
) -> TransportResult<()>
where
    F: FnMut(UdpMessage),
{
    if port == 0 {
        return Err(TransportError::InvalidPort);
    }

    let socket = UdpSocket::bind((bind_host, port)).await?;
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let recv = socket.recv_from(&mut buf);
        let (n, addr) = match timeout_s {
            Some(d) => match timeout(d, recv).await {
                Ok(res) => res?,
                Err(_) => return Ok(()),
            },
            None => recv.await?,
        };

        let data = buf[..n].to_vec();
        let text = String::from_utf8_lossy(&data).into_owned();

        let mut verified = None;
        if !known_keys.is_empty() || text.contains("[BEACON v2") {
            for env in decode_envelopes(&text) {
                if let Some(v) = verify_envelope(&env, known_keys) {
                    verified = Some(v);
                    break;
                }
            }
        }

        on_message(UdpMessage {
            data,
            text,
            addr,
            received_at: now_s(),
            verified,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_requires_nonempty_host() {
        let err = send("", 1234, b"hi", false, None).await.unwrap_err();
        assert!(matches!(err, TransportError::MissingHost));
    }

    #[tokio::test]
    async fn send_rejects_port_zero() {
        let err = send("127.0.0.1", 0, b"hi", false, None).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidPort));
    }

    #[tokio::test]
    async fn send_then_listen_round_trips_plain_text() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        drop(socket);

        let mut known = HashMap::new();
        let listener = tokio::spawn(async move {
            let mut received = None;
            listen(
                "127.0.0.1",
                port,
                &mut known,
                Some(Duration::from_millis(500)),
                |msg| received = Some(msg),
            )
            .await
            .unwrap();
            received
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        send("127.0.0.1", port, b"hello beacon", false, None).await.unwrap();

        let received = listener.await.unwrap();
        assert_eq!(received.unwrap().text, "hello beacon");
    }

    #[tokio::test]
    async fn send_then_listen_verifies_signed_v2_envelope_and_learns_key() {
        let alice = beacon_crypto::Identity::generate(false).unwrap();
        let hello = beacon_codec::Envelope::new("hello", "n1");
        let framed = beacon_codec::encode(hello, 2, Some(&alice), true).unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        drop(socket);

        let listener = tokio::spawn(async move {
            let mut known = HashMap::new();
            let mut received = None;
            listen(
                "127.0.0.1",
                port,
                &mut known,
                Some(Duration::from_millis(500)),
                |msg| received = Some(msg),
            )
            .await
            .unwrap();
            (received, known)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        send("127.0.0.1", port, framed.as_bytes(), false, None).await.unwrap();

        let (received, known) = listener.await.unwrap();
        let msg = received.expect("bob should have received alice's datagram");
        assert_eq!(msg.verified, Some(true));
        assert_eq!(known.get(alice.agent_id().as_str()), Some(&alice.public_key_hex()));
    }
}
