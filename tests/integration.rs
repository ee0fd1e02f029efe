//! End-to-end scenarios against real local listeners, exercising the
//! scenarios described for the race engine: a live endpoint winning over
//! a dead one, the cache recording the winner, total failure, and the
//! overall deadline.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use happy_eyeballs::{create_connection, set_cache, set_happy_eyeballs_enabled, with_cache, MemoryCache};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spawn_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[test]
fn connects_to_a_live_local_server() {
    init_log();
    let (listener, port) = spawn_listener();
    let accept = std::thread::spawn(move || listener.accept());

    let stream = create_connection(("localhost", port), Some(Duration::from_secs(2)), None).unwrap();
    assert!(stream.peer_addr().is_ok());

    accept.join().unwrap().unwrap();
}

#[test]
fn refused_connection_surfaces_as_connect_error() {
    init_log();
    // A single refused endpoint resolves to one address, so this exercises
    // the plain blocking-connect fallback (rule 4), not the race itself.
    let refused: SocketAddr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1).into();

    let err = happy_eyeballs::create_connection(
        ("127.0.0.1", refused.port()),
        Some(Duration::from_secs(2)),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, happy_eyeballs::Error::Connect(_)));
}

#[test]
fn timeout_elapses_without_a_responsive_endpoint() {
    init_log();
    // RFC 5737 TEST-NET-1: reserved for documentation, never routed.
    let blackhole: SocketAddr = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 80).into();

    let start = Instant::now();
    let err = happy_eyeballs::create_connection(
        ("192.0.2.1", blackhole.port()),
        Some(Duration::from_millis(200)),
        None,
    )
    .unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        err,
        happy_eyeballs::Error::Timeout | happy_eyeballs::Error::Connect(_)
    ));
}

#[test]
fn cache_round_trip_records_the_winner() {
    init_log();
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(60)));
    set_cache(Some(cache.clone()));

    let (listener, port) = spawn_listener();
    let accept = std::thread::spawn(move || listener.accept());
    create_connection(("127.0.0.1", port), Some(Duration::from_secs(2)), None).unwrap();
    accept.join().unwrap().unwrap();

    let got = cache.get("127.0.0.1", port);
    assert!(got.is_some());

    set_cache(Some(Arc::new(MemoryCache::new_default())));
}

#[test]
fn disabled_happy_eyeballs_still_connects() {
    init_log();
    set_happy_eyeballs_enabled(false);

    let (listener, port) = spawn_listener();
    let accept = std::thread::spawn(move || listener.accept());
    let stream = create_connection(("127.0.0.1", port), Some(Duration::from_secs(2)), None).unwrap();
    assert!(stream.peer_addr().is_ok());
    accept.join().unwrap().unwrap();

    set_happy_eyeballs_enabled(true);
}

#[test]
fn null_cache_disables_caching_entirely() {
    init_log();
    happy_eyeballs::set_cache(None);

    let (listener, port) = spawn_listener();
    let accept = std::thread::spawn(move || listener.accept());
    create_connection(("127.0.0.1", port), Some(Duration::from_secs(2)), None).unwrap();
    accept.join().unwrap().unwrap();

    with_cache(|c| assert!(c.is_none()));
    happy_eyeballs::set_cache(Some(Arc::new(MemoryCache::new_default())));
}
