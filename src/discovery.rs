use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Port the device listens on for a server's response.
pub const DEVICE_PORT: u16 = 8000;
/// Port the control server listens on for announcements.
pub const SERVER_PORT: u16 = 5000;
/// Pause between announcements while unanswered.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct Announcement {
    r#type: &'static str,
}

/// The searching half of the rendezvous: broadcast presence on a fixed
/// interval until any server answers.
///
/// Whoever owns the engine decides what happens on a find; this state
/// machine only reports the peer. Payload validity is irrelevant, the first
/// responder wins.
pub struct Discovery {
    socket: UdpSocket,
    target: SocketAddr,
    interval: Duration,
}

impl Discovery {
    pub async fn bind(local_port: u16, target: SocketAddr, interval: Duration) -> io::Result<Discovery> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        socket.set_broadcast(true)?;
        info!(port = socket.local_addr()?.port(), "waiting for response");

        Ok(Discovery {
            socket,
            target,
            interval,
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Announces until the first inbound datagram arrives, then returns its
    /// sender. Broadcasting stops the moment this returns.
    ///
    /// Datagrams queued while the socket sat idle are dropped first, so a
    /// re-entered search starts from scratch instead of returning a stale
    /// sender before the first announcement goes out.
    pub async fn search(&self) -> io::Result<SocketAddr> {
        self.drain()?;

        let announcement = serde_json::to_vec(&Announcement { r#type: "ui" })?;
        let mut ticker = tokio::time::interval(self.interval);
        let mut buf = [0u8; 1024];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(target = %self.target, "discovering...");
                    self.socket.send_to(&announcement, self.target).await?;
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (_, peer) = received?;
                    info!(%peer, "server responded");
                    return Ok(peer);
                }
            }
        }
    }

    fn drain(&self) -> io::Result<()> {
        let mut scratch = [0u8; 1024];
        loop {
            match self.socket.try_recv_from(&mut scratch) {
                Ok((_, stale)) => debug!(%stale, "dropping stale datagram"),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    async fn pair(interval: Duration) -> (Discovery, UdpSocket) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = server.local_addr().unwrap();
        let discovery = Discovery::bind(0, target, interval).await.unwrap();
        (discovery, server)
    }

    #[tokio::test]
    async fn keeps_rebroadcasting_while_unanswered() {
        let (discovery, server) = pair(Duration::from_millis(50)).await;

        let watching = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let mut payloads = Vec::new();
            for _ in 0..3 {
                let (n, _) = server.recv_from(&mut buf).await.unwrap();
                payloads.push(buf[..n].to_vec());
            }
            payloads
        });

        // No response ever comes, so the search must still be pending.
        let unanswered = timeout(Duration::from_millis(400), discovery.search()).await;
        assert!(unanswered.is_err(), "search returned without a response");

        let payloads = watching.await.unwrap();
        assert_eq!(payloads.len(), 3);
        for payload in payloads {
            let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            assert_eq!(json["type"], "ui");
        }
    }

    #[tokio::test]
    async fn stale_datagrams_do_not_shortcut_a_new_search() {
        let (discovery, server) = pair(Duration::from_millis(50)).await;

        // Something arrived while the socket sat idle between searches.
        let device = SocketAddr::from(([127, 0, 0, 1], discovery.local_addr().unwrap().port()));
        let stale = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        stale.send_to(b"leftover", device).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The leftover is drained, not returned as a peer: with no real
        // response the search must still be pending and still announcing.
        let unanswered = timeout(Duration::from_millis(200), discovery.search()).await;
        assert!(unanswered.is_err(), "search returned a stale sender");

        let mut buf = [0u8; 1024];
        let announced = timeout(Duration::from_millis(200), server.recv_from(&mut buf)).await;
        assert!(announced.is_ok(), "no announcement went out");
    }

    #[tokio::test]
    async fn first_response_wins_and_broadcasting_stops() {
        let (discovery, server) = pair(Duration::from_millis(50)).await;
        let server_addr = server.local_addr().unwrap();

        let responding = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (_, device) = server.recv_from(&mut buf).await.unwrap();
            // Payload content does not matter to the device.
            server.send_to(b"anything", device).await.unwrap();

            // The device must go quiet once connected.
            let more = timeout(Duration::from_millis(300), server.recv_from(&mut buf)).await;
            assert!(more.is_err(), "device kept broadcasting after a response");
        });

        let peer = discovery.search().await.unwrap();
        assert_eq!(peer, server_addr);
        responding.await.unwrap();
    }
}
