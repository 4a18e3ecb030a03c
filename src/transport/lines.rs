//! Newline-delimited JSON-RPC framing for byte-stream IPC channels.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines (`\r\n` is tolerated)
//! - Blank lines are ignored
//! - Requests on one connection are handled strictly in arrival order

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::host::RpcBridge;
use crate::rpc::RpcResponse;
use crate::transport::ShutdownSignal;

/// Longest request line accepted, excluding the newline.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Serves one connection until EOF, an I/O error, or shutdown.
///
/// Returns the number of requests answered. A line longer than
/// [`MAX_LINE_BYTES`] is answered with a parse error and ends the
/// connection.
///
/// # Errors
///
/// Returns an error if reading from or writing to the stream fails, or if
/// the peer sends an oversized line.
pub async fn serve_connection<S>(
    stream: S,
    bridge: &RpcBridge,
    shutdown: &mut ShutdownSignal,
) -> io::Result<u64>
where
    S: AsyncRead + AsyncWrite,
{
    serve_with_limit(stream, bridge, shutdown, MAX_LINE_BYTES).await
}

async fn serve_with_limit<S>(
    stream: S,
    bridge: &RpcBridge,
    shutdown: &mut ShutdownSignal,
    max_line: usize,
) -> io::Result<u64>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut answered = 0;
    let limit = u64::try_from(max_line).unwrap_or(u64::MAX).saturating_add(1);

    loop {
        buf.clear();
        let mut bounded = (&mut reader).take(limit);
        let read = tokio::select! {
            () = shutdown.wait() => return Ok(answered),
            read = bounded.read_until(b'\n', &mut buf) => read?,
        };

        if read == 0 {
            // EOF - peer closed
            return Ok(answered);
        }

        if buf.len() > max_line && buf.last() != Some(&b'\n') {
            let response =
                RpcResponse::parse_error(format!("request line exceeds {max_line} bytes")).to_json();
            write_line(&mut writer, &response).await?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request line exceeds {max_line} bytes"),
            ));
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let request = line.trim_end_matches(['\n', '\r']);
                if request.trim().is_empty() {
                    continue;
                }
                bridge.submit(request.to_string()).await
            }
            Err(e) => RpcResponse::parse_error(format!("request is not valid UTF-8: {e}")).to_json(),
        };

        write_line(&mut writer, &response).await?;
        answered += 1;
    }
}

/// Writes one JSON message followed by a newline.
///
/// # Errors
///
/// Returns an error if writing fails.
pub async fn write_line<W>(writer: &mut W, json: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Framing: messages must not contain embedded newlines
    debug_assert!(
        !json.contains('\n'),
        "JSON message must not contain embedded newlines"
    );

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}
