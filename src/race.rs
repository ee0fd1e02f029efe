//! The connection race engine.
//!
//! Drives a set of nonblocking connect attempts to completion, staggered
//! per RFC 6555, and returns the first one that connects. This is the core
//! of the crate; everything else is plumbing around it.

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, TcpStream as StdTcpStream};
use std::time::{Duration, Instant};

use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Interest, Poll, Token};
use socket2::Socket;

use crate::endpoint::Endpoint;

/// RFC 6555 §5.5 recommends 150-250ms between successive connection
/// attempts; this crate uses the upper end of that range, matching the
/// algorithm fixed by this crate's design (no configurable staggering).
pub(crate) const CONNECTION_ATTEMPT_DELAY: Duration = Duration::from_millis(250);

/// One in-flight nonblocking connect attempt.
///
/// Owned exclusively by the race loop until it is either handed to the
/// caller as the winner or closed. `started_at` exists for diagnostics;
/// the engine does not act on a per-attempt timeout.
struct AttemptSlot {
    token: Token,
    std_stream: StdTcpStream,
    mio_stream: MioTcpStream,
    endpoint: Endpoint,
    started_at: Instant,
}

impl AttemptSlot {
    fn close(mut self, poll: &Poll) {
        let _ = poll.registry().deregister(&mut self.mio_stream);
        log::trace!(
            "abandoning attempt to {} started {:?} ago",
            self.endpoint,
            self.started_at.elapsed()
        );
    }
}

enum StartOutcome {
    /// The connect completed without blocking; treated identically to a
    /// later writable-ready completion.
    Connected(StdTcpStream, Endpoint),
    /// The attempt is in progress and has been registered with the
    /// selector.
    Started(AttemptSlot),
}

/// Try endpoints from `pending`, in order, until one starts successfully
/// (`Started`), one connects immediately (`Connected`), or `pending` runs
/// dry (`Ok(None)`). Per-attempt start failures (bind, immediate connect
/// error) are absorbed into `last_error` and do not stop the scan.
fn start_next(
    pending: &mut VecDeque<Endpoint>,
    poll: &Poll,
    next_token: &mut usize,
    source_address: Option<SocketAddr>,
    last_error: &mut Option<io::Error>,
) -> io::Result<Option<StartOutcome>> {
    while let Some(endpoint) = pending.pop_front() {
        match try_start_one(endpoint.clone(), source_address, poll, next_token) {
            Ok(outcome) => return Ok(Some(outcome)),
            Err(e) => {
                log::debug!("attempt to {} failed to start: {}", endpoint, e);
                *last_error = Some(e);
            }
        }
    }
    Ok(None)
}

fn try_start_one(
    endpoint: Endpoint,
    source_address: Option<SocketAddr>,
    poll: &Poll,
    next_token: &mut usize,
) -> io::Result<StartOutcome> {
    let socket = Socket::new(endpoint.domain(), endpoint.socket_type(), Some(endpoint.protocol()))?;
    socket.set_nonblocking(true)?;

    if let Some(src) = source_address {
        socket.bind(&src.into())?;
    }

    let connect_result = socket.connect(&endpoint.addr().into());
    let std_stream: StdTcpStream = socket.into();

    match connect_result {
        Ok(()) => {
            log::debug!("connected immediately to {}", endpoint);
            Ok(StartOutcome::Connected(std_stream, endpoint))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            let token = Token(*next_token);
            *next_token += 1;

            let mio_clone = std_stream.try_clone()?;
            let mut mio_stream = MioTcpStream::from_std(mio_clone);
            poll.registry()
                .register(&mut mio_stream, token, Interest::WRITABLE)?;

            log::trace!("attempt started to {} (token {:?})", endpoint, token);

            Ok(StartOutcome::Started(AttemptSlot {
                token,
                std_stream,
                mio_stream,
                endpoint,
                started_at: Instant::now(),
            }))
        }
        Err(e) => Err(e),
    }
}

fn close_all(live: Vec<AttemptSlot>, poll: &Poll) {
    for slot in live {
        slot.close(poll);
    }
}

fn finish(
    mut stream: StdTcpStream,
    endpoint: Endpoint,
    live: Vec<AttemptSlot>,
    poll: &Poll,
) -> io::Result<(StdTcpStream, Endpoint)> {
    close_all(live, poll);
    stream.set_nonblocking(false)?;
    log::debug!("race won by {}", endpoint);
    Ok((stream, endpoint))
}

/// Race nonblocking connect attempts against `endpoints` and return the
/// first one to connect, restored to blocking mode.
///
/// `endpoints` must be nonempty. `timeout` is an absolute deadline for the
/// entire race (not per attempt); `None` means run until every endpoint is
/// exhausted. `source_address`, if given, is bound on every attempt socket.
pub(crate) fn race(
    endpoints: &[Endpoint],
    timeout: Option<Duration>,
    source_address: Option<SocketAddr>,
) -> io::Result<(StdTcpStream, Endpoint)> {
    assert!(!endpoints.is_empty(), "race() requires at least one endpoint");

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut pending: VecDeque<Endpoint> = endpoints.iter().cloned().collect();
    let mut live: Vec<AttemptSlot> = Vec::new();
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(16);
    let mut next_token = 0usize;
    let mut last_error: Option<io::Error> = None;

    // Step 1: start the first attempt.
    match start_next(&mut pending, &poll, &mut next_token, source_address, &mut last_error)? {
        Some(StartOutcome::Connected(stream, endpoint)) => {
            return finish(stream, endpoint, live, &poll);
        }
        Some(StartOutcome::Started(slot)) => live.push(slot),
        None => {}
    }

    // Step 2: schedule the first stagger tick.
    let mut next_stagger = Instant::now() + CONNECTION_ATTEMPT_DELAY;

    loop {
        if pending.is_empty() && live.is_empty() {
            break;
        }

        let now = Instant::now();

        let mut wait = deadline.map(|d| d.saturating_duration_since(now));
        if !pending.is_empty() {
            let stagger_wait = next_stagger.saturating_duration_since(now);
            wait = Some(match wait {
                Some(existing) => existing.min(stagger_wait),
                None => stagger_wait,
            });
        }

        // Step 3: block in the selector.
        poll.poll(&mut events, wait)?;

        // Step 4: handle writable-ready sockets, in live's insertion order
        // (the tie-break rule: first-in-set wins if several are ready).
        let ready: Vec<Token> = events.iter().filter(|e| e.is_writable()).map(|e| e.token()).collect();

        let mut winner_idx = None;
        let mut failed_idx = Vec::new();

        for (idx, slot) in live.iter().enumerate() {
            if winner_idx.is_some() {
                break;
            }
            if !ready.contains(&slot.token) {
                continue;
            }
            match slot.std_stream.take_error()? {
                None => winner_idx = Some(idx),
                Some(e) => {
                    log::debug!("attempt to {} failed: {}", slot.endpoint, e);
                    last_error = Some(e);
                    failed_idx.push(idx);
                }
            }
        }

        if let Some(idx) = winner_idx {
            let mut won = live.remove(idx);
            let _ = poll.registry().deregister(&mut won.mio_stream);
            return finish(won.std_stream, won.endpoint, live, &poll);
        }

        for idx in failed_idx.into_iter().rev() {
            let slot = live.remove(idx);
            slot.close(&poll);
        }

        let now = Instant::now();
        if let Some(d) = deadline {
            if now >= d {
                break;
            }
        }

        // Step 5/6: stagger tick fires, start the next attempt.
        if now >= next_stagger && !pending.is_empty() {
            match start_next(&mut pending, &poll, &mut next_token, source_address, &mut last_error)? {
                Some(StartOutcome::Connected(stream, endpoint)) => {
                    return finish(stream, endpoint, live, &poll);
                }
                Some(StartOutcome::Started(slot)) => {
                    live.push(slot);
                    next_stagger = Instant::now() + CONNECTION_ATTEMPT_DELAY;
                }
                None => {}
            }
        }
    }

    close_all(live, &poll);

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::TimedOut, "timed out connecting")
    }))
}

/// A straightforward iterative blocking connect, used when Happy Eyeballs
/// is disabled, unsupported, or would not help (single endpoint / single
/// family). Mirrors the platform's standard blocking TCP connect helper:
/// try each endpoint in resolver order until one connects.
pub(crate) fn blocking_connect(
    endpoints: &[Endpoint],
    timeout: Option<Duration>,
    source_address: Option<SocketAddr>,
) -> io::Result<(StdTcpStream, Endpoint)> {
    assert!(!endpoints.is_empty(), "blocking_connect() requires at least one endpoint");

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut last_error = None;

    for endpoint in endpoints {
        let remaining = match deadline {
            Some(d) => match crate::timeout::time_until_deadline(d) {
                Some(r) => Some(r),
                None => {
                    last_error = Some(io::Error::new(io::ErrorKind::TimedOut, "timed out connecting"));
                    break;
                }
            },
            None => None,
        };

        let attempt = connect_one_blocking(endpoint, remaining, source_address);
        match attempt {
            Ok(stream) => {
                log::debug!("connected to {}", endpoint);
                return Ok((stream, endpoint.clone()));
            }
            Err(e) => {
                log::debug!("connect to {} failed: {}", endpoint, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no endpoints to connect to")))
}

fn connect_one_blocking(
    endpoint: &Endpoint,
    timeout: Option<Duration>,
    source_address: Option<SocketAddr>,
) -> io::Result<StdTcpStream> {
    let socket = Socket::new(endpoint.domain(), endpoint.socket_type(), Some(endpoint.protocol()))?;

    if let Some(src) = source_address {
        socket.bind(&src.into())?;
    }

    match timeout {
        Some(t) => socket.connect_timeout(&endpoint.addr().into(), t)?,
        None => socket.connect(&endpoint.addr().into())?,
    }

    Ok(socket.into())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{TcpListener, Ipv4Addr, SocketAddrV4};

    fn local_listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, Endpoint::new(addr))
    }

    #[test]
    fn races_two_endpoints_and_picks_the_live_one() {
        let (listener, good) = local_listener();
        let dead = Endpoint::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1)));

        let accept_thread = std::thread::spawn(move || listener.accept());

        let (_, won) = race(&[dead, good.clone()], Some(Duration::from_secs(2)), None).unwrap();
        assert_eq!(won, good);

        accept_thread.join().unwrap().unwrap();
    }

    #[test]
    fn single_endpoint_has_no_stagger() {
        let (listener, good) = local_listener();
        let accept_thread = std::thread::spawn(move || listener.accept());

        let start = Instant::now();
        let (_, won) = race(&[good.clone()], Some(Duration::from_secs(2)), None).unwrap();
        assert!(start.elapsed() < CONNECTION_ATTEMPT_DELAY);
        assert_eq!(won, good);

        accept_thread.join().unwrap().unwrap();
    }

    #[test]
    fn total_failure_aggregates_last_error() {
        let a = Endpoint::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 1)));
        let b = Endpoint::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 2)));

        let err = race(&[a, b], Some(Duration::from_secs(2)), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn zero_timeout_without_a_ready_socket_times_out() {
        // A TCP address that is routable but will not ACK: RFC 5737 TEST-NET-1.
        let slow = Endpoint::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 80)));
        let err = race(&[slow.clone(), slow], Some(Duration::ZERO), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
