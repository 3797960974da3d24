/*!
 * Network Layer and Event Loop
 *
 * A single blocking accept loop hands each new connection to one of a
 * fixed set of reactor threads. Each reactor runs its own mio event loop
 * over the connections it owns; a connection lives on one reactor for its
 * whole life, so its requests are answered strictly in arrival order.
 */

use crate::dispatch::Dispatcher;
use crate::error::CommandError;
use crate::protocol::{write_error, Decoder, Frame};
use anyhow::{anyhow, Context, Result};
use bytes::{Buf, BytesMut};
use crossbeam::channel::{unbounded, Receiver, SendError, Sender};
use hashbrown::HashMap;
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Size of read buffer for incoming data
const READ_BUF: usize = 4096;

/// Token reserved for the reactor's waker
const WAKER: Token = Token(0);

/// Bind the listening socket
///
/// Uses socket2 so SO_REUSEADDR is set before binding. The returned
/// listener is blocking; `serve` accepts on it directly.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    socket
        .bind(&addr.into())
        .with_context(|| format!("cannot bind {}", addr))?;
    socket.listen(1024)?;

    Ok(socket.into())
}

/// Sending side of a reactor thread
struct Worker {
    id: usize,
    tx: Sender<std::net::TcpStream>,
    waker: Waker,
}

/// Reactors still accepting connections, used round-robin
struct Pool {
    workers: Vec<Worker>,
    next: usize,
}

impl Pool {
    fn new(workers: Vec<Worker>) -> Self {
        Self { workers, next: 0 }
    }

    /// Give `stream` to the next running reactor
    ///
    /// A reactor whose thread has exited is removed from the pool and the
    /// connection goes to the one after it. Fails once no reactor is left.
    fn hand_off(&mut self, mut stream: std::net::TcpStream) -> Result<()> {
        loop {
            if self.workers.is_empty() {
                return Err(anyhow!("all reactors have stopped"));
            }
            let i = self.next % self.workers.len();

            match self.workers[i].tx.send(stream) {
                Ok(()) => {
                    self.next = i.wrapping_add(1);
                    let worker = &self.workers[i];
                    if let Err(e) = worker.waker.wake() {
                        log::warn!("cannot wake worker {}: {}", worker.id, e);
                    }
                    return Ok(());
                }
                Err(SendError(s)) => {
                    let dead = self.workers.remove(i);
                    log::error!("worker {} has stopped, removing it from the pool", dead.id);
                    // Index i now names the worker after the removed one
                    self.next = i;
                    stream = s;
                }
            }
        }
    }
}

/// Run the server on an already bound listener
///
/// Spawns `workers` reactor threads, then accepts connections forever on
/// the calling thread, distributing them round-robin.
pub fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>, workers: usize) -> Result<()> {
    let workers = workers.max(1);
    let mut reactors = Vec::with_capacity(workers);

    for id in 0..workers {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        let (tx, rx) = unbounded();
        let dispatcher = dispatcher.clone();

        std::thread::Builder::new()
            .name(format!("cinder-worker-{}", id))
            .spawn(move || {
                if let Err(e) = run_worker_loop(id, poll, rx, dispatcher) {
                    log::error!("worker {} failed: {}", id, e);
                }
            })?;

        reactors.push(Worker { id, tx, waker });
    }
    let mut pool = Pool::new(reactors);

    log::info!(
        "accepting connections on {} ({} workers)",
        listener.local_addr()?,
        workers
    );

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("accept error: {}", e);
                continue;
            }
        };

        pool.hand_off(stream)?;
    }

    Ok(())
}

/// Event loop for a single reactor thread
fn run_worker_loop(
    id: usize,
    mut poll: Poll,
    rx: Receiver<std::net::TcpStream>,
    dispatcher: Arc<Dispatcher>,
) -> Result<()> {
    let mut events = Events::with_capacity(1024);
    let mut conns: HashMap<Token, Connection> = HashMap::new();
    let mut next_tok: usize = 1;

    // Buffer for reading from sockets
    let mut tmp_buf = [0u8; READ_BUF];

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == ErrorKind::Interrupted {
                continue;
            }
            return Err(e.into());
        }

        for ev in events.iter() {
            match ev.token() {
                WAKER => {
                    for stream in rx.try_iter() {
                        let token = Token(next_tok);
                        // Skip 0 (WAKER)
                        next_tok = next_tok.wrapping_add(1).max(1);

                        match Connection::register(stream, token, poll.registry()) {
                            Ok(conn) => {
                                log::debug!("worker {} accepted {}", id, conn.peer);
                                conns.insert(token, conn);
                            }
                            Err(e) => log::warn!("worker {} failed to register connection: {}", id, e),
                        }
                    }
                }
                token => {
                    let open = match conns.get_mut(&token) {
                        Some(conn) => conn.ready(ev, &dispatcher, &mut tmp_buf, poll.registry()),
                        None => continue,
                    };

                    if !open {
                        if let Some(mut conn) = conns.remove(&token) {
                            let _ = poll.registry().deregister(&mut conn.sock);
                            log::debug!("worker {} closed {}", id, conn.peer);
                        }
                    }
                }
            }
        }
    }
}

/// Outcome of draining a socket into `rbuf`
#[derive(Debug, PartialEq)]
enum Fill {
    /// The socket has no more data for now
    WouldBlock,
    /// The peer closed its sending side
    Eof,
    /// `rbuf` reached the request size limit
    Full,
}

/// Per-client state owned by a reactor
///
/// Dropping it closes the socket.
struct Connection {
    sock: TcpStream,
    peer: String,
    rbuf: BytesMut,
    wbuf: BytesMut,
    frames: Vec<Frame>,
    decoder: Decoder,
    /// No more input is read; the connection ends once `wbuf` is flushed
    closing: bool,
}

impl Connection {
    fn register(stream: std::net::TcpStream, token: Token, registry: &Registry) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let mut sock = TcpStream::from_std(stream);
        sock.set_nodelay(true).ok();
        registry.register(&mut sock, token, Interest::READABLE)?;

        Ok(Self {
            sock,
            peer,
            rbuf: BytesMut::with_capacity(READ_BUF),
            wbuf: BytesMut::new(),
            frames: Vec::with_capacity(8),
            decoder: Decoder::new(),
            closing: false,
        })
    }

    /// React to a readiness event
    ///
    /// Returns `false` once the connection is finished: an I/O error
    /// occurred, or input has ended and every reply has been written.
    fn ready(&mut self, ev: &Event, dispatcher: &Dispatcher, tmp: &mut [u8], registry: &Registry) -> bool {
        if ev.is_readable() && !self.closing {
            let limit = dispatcher.config().max_request_bytes;
            loop {
                let fill = match self.fill(tmp, limit) {
                    Ok(f) => f,
                    Err(e) => {
                        log::debug!("read error from {}: {}", self.peer, e);
                        return false;
                    }
                };
                // Requests that arrived before EOF still get answered
                self.process(dispatcher);

                match fill {
                    Fill::WouldBlock => break,
                    Fill::Eof => {
                        self.closing = true;
                        break;
                    }
                    Fill::Full if self.rbuf.len() >= limit => {
                        log::warn!("{} sent a request over {} bytes, closing", self.peer, limit);
                        write_error(&CommandError::RequestTooLarge.to_string(), &mut self.wbuf);
                        self.rbuf.clear();
                        self.decoder = Decoder::new();
                        self.closing = true;
                        break;
                    }
                    // Decoding made room; keep reading
                    Fill::Full => {}
                }
            }
        }

        if let Err(e) = self.flush() {
            log::debug!("write error to {}: {}", self.peer, e);
            return false;
        }

        let interest = if self.closing {
            if self.wbuf.is_empty() {
                return false;
            }
            Interest::WRITABLE
        } else if self.wbuf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        registry.reregister(&mut self.sock, ev.token(), interest).is_ok()
    }

    /// Drain the socket into `rbuf`, stopping once it holds `limit` bytes
    fn fill(&mut self, tmp: &mut [u8], limit: usize) -> io::Result<Fill> {
        loop {
            if self.rbuf.len() >= limit {
                return Ok(Fill::Full);
            }
            match self.sock.read(tmp) {
                Ok(0) => return Ok(Fill::Eof),
                Ok(n) => self.rbuf.extend_from_slice(&tmp[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(Fill::WouldBlock),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn process(&mut self, dispatcher: &Dispatcher) {
        self.decoder.decode_all(&mut self.rbuf, &mut self.frames);
        for frame in self.frames.drain(..) {
            log::trace!("{} -> {:?}", self.peer, frame);
            dispatcher.handle(frame, &mut self.wbuf);
        }
    }

    /// Write as much of `wbuf` as the socket accepts
    fn flush(&mut self) -> io::Result<()> {
        while !self.wbuf.is_empty() {
            match self.sock.write(&self.wbuf) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => self.wbuf.advance(n),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
