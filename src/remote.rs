use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::command::{self, Command};
use crate::engine::AnimationEngine;
use crate::strip::StripDevice;

/// The connected half of the rendezvous: one JSON command per line from the
/// discovered server, forwarded into the engine until the stream closes.
///
/// Bad lines are dropped, not fatal; returning (even with an error) means
/// the connection is gone and the caller should search again.
pub async fn run<D: StripDevice>(peer: SocketAddr, engine: &AnimationEngine<D>) -> io::Result<()> {
    info!(%peer, "connecting to discovered server");
    let stream = TcpStream::connect(peer).await?;
    let mut lines = BufReader::new(stream).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match serde_json::from_str::<Command>(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, payload = %line, "did not understand message from server");
                continue;
            }
        };

        if let Err(e) = command::dispatch(command, engine) {
            warn!(error = %e, payload = %line, "dropping message from server");
        }
    }

    info!(%peer, "server closed the stream");
    Ok(())
}
