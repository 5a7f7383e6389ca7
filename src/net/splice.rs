//! Byte splicing between two TCP streams.
//!
//! The pair lives until the first direction ends. EOF or an error on either
//! side returns immediately and the caller drops both sockets, so a peer
//! that never closes cannot pin the other side open.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const BUFFER_SIZE: usize = 8192;

/// Relay bytes both ways until either side closes or errors.
/// Returns `(client → upstream, upstream → client)` byte counts.
pub async fn splice(client: &mut TcpStream, upstream: &mut TcpStream) -> io::Result<(u64, u64)> {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();
    let mut to_upstream = 0u64;
    let mut from_upstream = 0u64;

    let result = tokio::select! {
        r = pump(&mut client_read, &mut upstream_write, &mut to_upstream) => r,
        r = pump(&mut upstream_read, &mut client_write, &mut from_upstream) => r,
    };

    result.map(|()| (to_upstream, from_upstream))
}

async fn pump<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        *copied += n as u64;
    }
}
