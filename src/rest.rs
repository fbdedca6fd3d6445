use std::io;

use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::color::Color;
use crate::command::{self, Command};
use crate::engine::AnimationEngine;
use crate::error::Error;
use crate::strip::StripDevice;

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Deserialize)]
struct FillBody {
    value: Color,
}

#[derive(Deserialize)]
struct GradientBody {
    stops: Vec<Color>,
}

/// Local control surface. One request per connection, JSON in, JSON out.
pub async fn serve<D: StripDevice>(listener: TcpListener, engine: AnimationEngine<D>) {
    info!("rest is ready");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, engine).await {
                        debug!(error = %e, "rest connection dropped");
                    }
                });
            }
            Err(e) => debug!(error = %e, "rest accept failed"),
        }
    }
}

async fn handle<D: StripDevice>(mut stream: TcpStream, engine: AnimationEngine<D>) -> io::Result<()> {
    let request = match Request::read_from(&mut stream).await? {
        Some(request) => request,
        None => return Ok(()),
    };

    let (status, body) = route(&request, &engine).await;
    respond(&mut stream, status, &body).await
}

async fn route<D: StripDevice>(
    request: &Request,
    engine: &AnimationEngine<D>,
) -> (u16, serde_json::Value) {
    let outcome = match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/color/fill") => serde_json::from_slice::<FillBody>(&request.body)
            .map_err(invalid_body)
            .and_then(|body| command::dispatch(Command::Fill { value: body.value }, engine)),
        ("POST", "/color/gradient") => serde_json::from_slice::<GradientBody>(&request.body)
            .map_err(invalid_body)
            .and_then(|body| command::dispatch(Command::Gradient { stops: body.stops }, engine)),
        ("POST", "/color/rainbow") => command::dispatch(Command::Rainbow, engine),
        ("GET", "/color/status") => {
            return (200, json!(engine.status().await));
        }
        _ => {
            let path = &request.path;
            return (
                404,
                json!({ "error": format!("the resource '{path}' does not exist on the server") }),
            );
        }
    };

    match outcome {
        Ok(()) => (200, json!({ "ok": true })),
        Err(e) => (400, json!({ "error": e.to_string() })),
    }
}

fn invalid_body(e: serde_json::Error) -> Error {
    Error::InvalidInput(e.to_string())
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

impl Request {
    /// Minimal HTTP/1.1 parsing: request line, Content-Length, body. Returns
    /// `None` when the peer hangs up before sending a full head.
    async fn read_from(stream: &mut TcpStream) -> io::Result<Option<Request>> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let head_end = loop {
            if let Some(pos) = find_blank_line(&buf) {
                break pos;
            }
            if buf.len() > MAX_REQUEST_BYTES {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "request too large"));
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let mut lines = head.lines();

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_uppercase();
        // Routes never carry a trailing slash.
        let path = parts
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_owned();

        let content_length = lines
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.trim().eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .next()
            .unwrap_or(0);

        if content_length > MAX_REQUEST_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request too large"));
        }

        let mut body = buf[head_end + 4..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(content_length);

        Ok(Some(Request { method, path, body }))
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn respond(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "Not Found",
    };
    let body = body.to_string();

    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, PUT, HEAD, OPTIONS\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
