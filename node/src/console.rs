// Copyright (c) 2024 Botho Foundation

//! Line chat over an established connection.

use anyhow::{Context, Result};
use picolo_rendezvous::{drain_lines, Connection};
use std::io::Write;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

const PROMPT: &str = "> ";

/// Chat with the connected peer until either side closes.
///
/// Incoming lines are printed to stdout, stdin lines are sent to the peer.
pub async fn run(connection: Connection) -> Result<()> {
    let peer = connection.peer;
    let (mut reader, mut writer) = connection.session.into_split();

    let printing = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        relay_incoming(&mut reader, &mut stdout).await
    });
    let mut stdin = BufReader::new(io::stdin());
    let mut stdout = std::io::stdout();

    tokio::select! {
        printed = printing => {
            printed
                .context("Console reader task failed")?
                .context("Failed to read from peer")?;
            info!(%peer, "Peer closed the stream");
        }
        sent = forward_input(&mut stdin, &mut writer, &mut stdout) => {
            sent.context("Failed to send to peer")?;
            info!(%peer, "Input closed");
        }
    }

    Ok(())
}

/// Copy every non-blank line from `reader` to `out`, highlighted, until end
/// of stream.
pub async fn relay_incoming<R, O>(reader: &mut R, out: &mut O) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    O: Write,
{
    let mut result = Ok(());
    drain_lines(reader, |line| {
        if result.is_ok() {
            result = write!(out, "\x1b[32m{line}\x1b[0m\n{PROMPT}").and_then(|_| out.flush());
        }
    })
    .await?;
    result
}

/// Send each line of `input` to `writer`, flushing after every line.
/// The prompt goes to `out` before every read. Returns when `input` is
/// exhausted.
pub async fn forward_input<I, W, O>(input: &mut I, writer: &mut W, out: &mut O) -> io::Result<()>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    O: Write,
{
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        writer.write_all(line.trim_end_matches('\n').as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relay_skips_blank_lines() {
        let mut reader: &[u8] = b"hello\n\nworld\n";
        let mut out = Vec::new();

        relay_incoming(&mut reader, &mut out).await.unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(
            printed,
            "\x1b[32mhello\x1b[0m\n> \x1b[32mworld\x1b[0m\n> "
        );
    }

    #[tokio::test]
    async fn test_relay_empty_stream() {
        let mut reader: &[u8] = b"";
        let mut out = Vec::new();

        relay_incoming(&mut reader, &mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_forward_terminates_every_line() {
        let mut input: &[u8] = b"select 1\nlast line without newline";
        let mut sent = Vec::new();
        let mut prompts = Vec::new();

        forward_input(&mut input, &mut sent, &mut prompts).await.unwrap();

        assert_eq!(sent, b"select 1\nlast line without newline\n");
        assert_eq!(prompts, b"> > > ");
    }

    #[tokio::test]
    async fn test_prompt_shown_before_first_input() {
        let mut input: &[u8] = b"";
        let mut sent = Vec::new();
        let mut prompts = Vec::new();

        forward_input(&mut input, &mut sent, &mut prompts).await.unwrap();

        assert!(sent.is_empty());
        assert_eq!(prompts, b"> ");
    }

    #[tokio::test]
    async fn test_forward_write_error() {
        let (ours, theirs) = tokio::io::duplex(64);
        drop(theirs);
        let (_read, mut write) = tokio::io::split(ours);
        let mut input: &[u8] = b"hello\n";

        let mut prompts = Vec::new();

        assert!(forward_input(&mut input, &mut write, &mut prompts).await.is_err());
        assert_eq!(prompts, b"> ");
    }
}
