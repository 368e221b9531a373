//! # TCP relay
//!
//! The proxy listens where the client expects the PIM. For every accepted client it
//! opens a fresh connection to the real PIM and relays both directions unchanged, each
//! in its own task. Each chunk is decoded and then forwarded unchanged. Decoding never
//! blocks, and it records a PIM verdict before the client can see it.
//!
//! ```text
//! client ──► pump(Client) ──► PIM        decoded events
//! client ◄── pump(Pim)    ◄── PIM   ──►  mpsc ──► consumer (metrics + display)
//! ```
//!
//! The two directions of a session share one [`SharedHandshake`]. When either side
//! closes, the session ends and all decode state is dropped.

use anyhow::{anyhow, Result};
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::display::{self, EventPrinter};
use crate::metrics;
use crate::upb::auth::Credentials;
use crate::upb::{decoder_for, SharedHandshake, Side, SideEvent, StreamDecoder};

const READ_BUF_SIZE: usize = 4096;

pub struct ProxyServer {
    config: Config,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.proxy.bind_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow!("Failed to listen on {}: {}", addr, e))
    }

    /// Accept clients until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        info!(
            "Listening on {}, relaying to PIM at {}",
            self.config.proxy.bind_addr(),
            self.config.proxy.pim_addr()
        );
        if self.config.credentials().is_none() {
            info!("No PIM password configured; client responses will not be verified");
        }
        let events = spawn_event_consumer(EventPrinter::new(&self.config.display));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (client, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    info!("Client connected from {}", peer);
                    metrics::inc_sessions();
                    let pim_addr = self.config.proxy.pim_addr();
                    let credentials = self.config.credentials();
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay_session(client, &pim_addr, credentials, events).await {
                            warn!("Session {} ended with error: {}", peer, e);
                        }
                        display::log_session_summary(&peer.to_string());
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Count and display every event sent on the returned channel.
pub fn spawn_event_consumer(printer: EventPrinter) -> mpsc::UnboundedSender<SideEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SideEvent>();
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            metrics::observe(&ev.event);
            printer.emit(&ev);
        }
        debug!("Event consumer stopped");
    });
    tx
}

/// Relay one client to a new PIM connection until either end closes.
pub async fn relay_session(
    client: TcpStream,
    pim_addr: &str,
    credentials: Option<Credentials>,
    events: mpsc::UnboundedSender<SideEvent>,
) -> Result<()> {
    let pim = TcpStream::connect(pim_addr)
        .await
        .map_err(|e| anyhow!("Failed to connect to PIM at {}: {}", pim_addr, e))?;
    debug!("Connected to PIM at {}", pim_addr);
    let _ = client.set_nodelay(true);
    let _ = pim.set_nodelay(true);

    let shared = SharedHandshake::new(credentials);
    let (client_rx, client_tx) = client.into_split();
    let (pim_rx, pim_tx) = pim.into_split();

    let mut upstream: JoinHandle<Result<u64>> = tokio::spawn(pump(
        client_rx,
        pim_tx,
        decoder_for(Side::Client, shared.clone()),
        events.clone(),
    ));
    let mut downstream: JoinHandle<Result<u64>> = tokio::spawn(pump(
        pim_rx,
        client_tx,
        decoder_for(Side::Pim, shared),
        events,
    ));

    let (side, joined) = tokio::select! {
        r = &mut upstream => {
            downstream.abort();
            (Side::Client, r)
        }
        r = &mut downstream => {
            upstream.abort();
            (Side::Pim, r)
        }
    };
    let bytes = joined.map_err(|e| anyhow!("{} relay task failed: {}", side, e))??;
    debug!("{} closed after {} bytes", side, bytes);
    Ok(())
}

/// Copy `reader` to `writer`, decoding each chunk before it is forwarded. Returns the
/// byte count once `reader` reaches end of stream.
pub async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    mut decoder: Box<dyn StreamDecoder>,
    events: mpsc::UnboundedSender<SideEvent>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let side = decoder.side();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| anyhow!("Read from {} failed: {}", side, e))?;
        if n == 0 {
            let _ = writer.shutdown().await;
            return Ok(total);
        }
        for event in decoder.feed(&buf[..n]) {
            if events.send(SideEvent { side, event }).is_err() {
                trace!("Event consumer gone; {} event dropped", side);
            }
        }

        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| anyhow!("Forward of {} bytes from {} failed: {}", n, side, e))?;
        total += n as u64;
        metrics::add_bytes(side, n);
    }
}
