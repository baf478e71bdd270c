// Copyright (c) 2024 Botho Foundation

//! Line framing and the connect handshake.
//!
//! Every message is one UTF-8 line terminated by `\n`. There are no length
//! prefixes, no checksums and no negative acknowledgement: a server that
//! does not understand the first line simply says nothing.

use crate::{error::HandshakeError, protocol::CONNECT_REQUEST};
use libp2p::PeerId;
use std::io;
use tokio::io::{
    split, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
    BufStream, ReadHalf, WriteHalf,
};
use tracing::{debug, info};

/// What an announcing node tells a connecting peer about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Name of the hosted database
    pub name: String,
    /// Number of nodes backing the database
    pub node_count: u32,
}

impl DatabaseInfo {
    /// Create database info.
    pub fn new(name: impl Into<String>, node_count: u32) -> Self {
        Self {
            name: name.into(),
            node_count,
        }
    }
}

/// The two response lines received by a connecting peer, newline stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDatabase {
    /// First response line
    pub name: String,
    /// Second response line, left as text
    pub node_count: String,
}

impl RemoteDatabase {
    /// The node count as a number, if the peer sent one.
    pub fn node_count(&self) -> Option<u32> {
        self.node_count.parse().ok()
    }
}

/// How a server-side handshake ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerOutcome {
    /// The peer asked to connect and was sent the database info.
    /// `ack` is the line it answered with, `None` if the stream ended first.
    Served {
        /// Acknowledgement line (normally the peer id), newline stripped
        ack: Option<String>,
    },

    /// The first line was not a connect request; nothing was sent back.
    Ignored {
        /// The line as received, terminator included
        request: String,
    },
}

/// Line-buffered view over one duplex stream.
///
/// A session owns its stream; it is dropped together with the stream when
/// the handshake, or whatever follows it, is done.
pub struct HandshakeSession<S> {
    stream: BufStream<S>,
}

impl<S> HandshakeSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Read one line including its `\n`.
    ///
    /// Returns an empty string at end of stream. The final line of a stream
    /// may lack the terminator.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.stream.read_line(&mut line).await?;
        Ok(line)
    }

    /// Buffer `line` followed by `\n`. Nothing is sent until [`Self::flush`].
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await
    }

    /// Send everything buffered so far.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    /// Split into a line reader and a raw writer, keeping any bytes already
    /// buffered on the read side.
    pub fn into_split(self) -> (BufReader<ReadHalf<BufStream<S>>>, WriteHalf<BufStream<S>>) {
        let (reader, writer) = split(self.stream);
        (BufReader::new(reader), writer)
    }
}

/// Run the announcing side of the handshake.
///
/// Reads one line; only an exact `connect\n` is answered, with the database
/// name and node count on separate lines. The peer's acknowledgement is read
/// and returned. The stream is left open.
pub async fn serve<S>(
    session: &mut HandshakeSession<S>,
    info: &DatabaseInfo,
) -> Result<ServerOutcome, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = session.read_line().await?;
    info!(request = %request.trim_end_matches('\n'), "Received handshake request");

    if request.strip_suffix('\n') != Some(CONNECT_REQUEST) {
        debug!(?request, "Not a connect request, ignoring");
        return Ok(ServerOutcome::Ignored { request });
    }

    session.write_line(&info.name).await?;
    session.write_line(&info.node_count.to_string()).await?;
    session.flush().await?;

    let ack = session.read_line().await?;
    if ack.is_empty() {
        debug!("Stream ended before acknowledgement");
        return Ok(ServerOutcome::Served { ack: None });
    }

    let ack = strip_terminator(ack);
    info!(peer = %ack, "Handshake acknowledged");
    Ok(ServerOutcome::Served { ack: Some(ack) })
}

/// Run the connecting side of the handshake.
///
/// Sends `connect\n`, reads the two response lines, then answers with
/// `local_peer_id`. A stream that ends before both response lines arrive is
/// an error.
pub async fn initiate<S>(
    session: &mut HandshakeSession<S>,
    local_peer_id: &PeerId,
) -> Result<RemoteDatabase, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.write_line(CONNECT_REQUEST).await?;
    session.flush().await?;

    let name = expect_line(session, "database name").await?;
    info!(database = %name, "Received database name");

    let node_count = expect_line(session, "node count").await?;
    info!(nodes = %node_count, "Received node count");

    session.write_line(&local_peer_id.to_string()).await?;
    session.flush().await?;

    Ok(RemoteDatabase { name, node_count })
}

/// Read lines until end of stream, passing every non-blank one to `on_line`
/// with its terminator stripped.
pub async fn drain_lines<R, F>(reader: &mut R, mut on_line: F) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str),
{
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        if line.is_empty() {
            return Ok(());
        }
        if line != "\n" {
            on_line(line.trim_end_matches('\n'));
        }
    }
}

async fn expect_line<S>(
    session: &mut HandshakeSession<S>,
    what: &'static str,
) -> Result<String, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let line = session.read_line().await?;
    if line.is_empty() {
        return Err(HandshakeError::UnexpectedEof(what));
    }
    Ok(strip_terminator(line))
}

fn strip_terminator(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
    }
    line
}
