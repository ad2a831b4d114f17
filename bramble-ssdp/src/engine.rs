//! The SSDP state machine, sans-IO

use crate::message;
use crate::message::Datagram;
use crate::udp::TargetedSend;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

#[cfg(not(test))]
use std::time::Instant;

#[cfg(test)]
use mock_instant::Instant;

/// The SSDP multicast group, host byte order
pub const GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// The SSDP port number
pub const PORT: u16 = 1900;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1200);

const MAX_PACKET: usize = 512;

/// What the engine advertises about its device
///
/// One root device per engine; the engine fills in everything
/// protocol-shaped (USN prefix, NT, cache-control) itself.
pub struct Advertisement {
    /// The device UUID, canonical text form without the `uuid:` prefix
    pub unique_id: String,

    /// Model name and version for the `SERVER` header, e.g. `Sensor/1.0`
    pub server: String,

    /// Where the device description document is served from
    ///
    /// The host part is a placeholder: the engine rewrites it to
    /// whichever local address each particular peer can reach.
    pub location: url::Url,
}

struct PendingResponse {
    reply_to: SocketAddr,
    reply_from: IpAddr,
    due: Instant,
}

/// SSDP announcer and search responder
///
/// Owns no sockets and no threads. Drive it with [`Engine::on_data`]
/// for each received datagram and [`Engine::wakeup`] at least as often
/// as [`Engine::next_wakeup`] asks for.
pub struct Engine {
    advertisement: Advertisement,
    local_ip: IpAddr,
    interval: Duration,
    next_notify: Instant,
    pending: Option<PendingResponse>,
}

/// Pick a uniform random delay of at most `maximum_wait_sec` seconds
///
/// Searches say how long they are prepared to wait (`MX`); spreading
/// responses across that window stops every device on the network
/// answering in the same instant.
fn response_delay(maximum_wait_sec: u8) -> Duration {
    if maximum_wait_sec == 0 {
        return Duration::ZERO;
    }
    use rand::Rng;
    let ms = rand::rng()
        .random_range(0..=u64::from(maximum_wait_sec) * 1000);
    Duration::from_millis(ms)
}

impl Engine {
    /// Create an engine announcing every 20 minutes
    ///
    /// `local_ip` is the interface address used for multicast
    /// announcements (and their `LOCATION` rewrite). The first
    /// announcement goes out on the first call to [`Engine::wakeup`].
    #[must_use]
    pub fn new(advertisement: Advertisement, local_ip: IpAddr) -> Self {
        Self::with_interval(advertisement, local_ip, DEFAULT_INTERVAL)
    }

    /// Create an engine with a non-default announcement interval
    #[must_use]
    pub fn with_interval(
        advertisement: Advertisement,
        local_ip: IpAddr,
        interval: Duration,
    ) -> Self {
        Self {
            advertisement,
            local_ip,
            interval,
            next_notify: Instant::now(),
            pending: None,
        }
    }

    /// How long until the engine next needs a [`Engine::wakeup`] call
    ///
    /// Zero means "right now". Callers that just tick once a second
    /// need not bother with this; it exists for event loops that want
    /// to sleep precisely.
    #[must_use]
    pub fn next_wakeup(&self) -> Duration {
        let now = Instant::now();
        let mut next = self.next_notify;
        if let Some(ref pending) = self.pending {
            if pending.due < next {
                next = pending.due;
            }
        }
        next.saturating_duration_since(now)
    }

    /// Do any timed work that has come due
    ///
    /// Sends the periodic multicast announcement and any scheduled
    /// search response whose delay has elapsed. Send failures are
    /// logged and otherwise ignored; SSDP is best-effort and the next
    /// announcement is never far away.
    pub fn wakeup<SCK: TargetedSend>(&mut self, socket: &SCK) {
        let now = Instant::now();
        if now >= self.next_notify {
            self.next_notify = now + self.interval;
            self.notify(socket);
        }
        if let Some(pending) = self.pending.take() {
            if now >= pending.due {
                self.respond(
                    socket,
                    &pending.reply_to,
                    &pending.reply_from,
                );
            } else {
                self.pending = Some(pending);
            }
        }
    }

    /// Deal with a received datagram
    ///
    /// `wasto` is the local address the datagram arrived on (which is
    /// where any response claims its `LOCATION` lives), `wasfrom` the
    /// peer. Datagrams that aren't well-formed SSDP are discarded
    /// without reply.
    pub fn on_data(
        &mut self,
        buf: &[u8],
        wasto: IpAddr,
        wasfrom: SocketAddr,
    ) {
        match message::parse(buf) {
            Ok(Datagram::Search {
                search_target,
                maximum_wait_sec,
            }) => {
                tracing::trace!(
                    st = search_target.as_deref().unwrap_or(""),
                    mx = maximum_wait_sec,
                    %wasfrom,
                    "m-search"
                );
                // One response slot: a newer search supersedes any
                // response still waiting for its delay to elapse.
                self.pending = Some(PendingResponse {
                    reply_to: wasfrom,
                    reply_from: wasto,
                    due: Instant::now()
                        + response_delay(maximum_wait_sec),
                });
            }
            Ok(Datagram::Notify) => {
                tracing::trace!(%wasfrom, "peer notify");
            }
            Err(e) => {
                tracing::trace!(%wasfrom, error = %e, "ignored");
            }
        }
    }

    fn location_for(&self, host: IpAddr) -> url::Url {
        let mut url = self.advertisement.location.clone();
        if url.set_ip_host(host).is_err() {
            tracing::warn!(%url, "location has no host to rewrite");
        }
        url
    }

    fn notify<SCK: TargetedSend>(&self, socket: &SCK) {
        let url = self.location_for(self.local_ip);
        let to = SocketAddr::V4(SocketAddrV4::new(GROUP, PORT));
        let result =
            socket.send_with(MAX_PACKET, &to, &self.local_ip, |b| {
                message::build_notify(
                    b,
                    self.interval.as_secs() as u32,
                    &self.advertisement.server,
                    &self.advertisement.unique_id,
                    url.as_str(),
                )
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "notify failed");
        }
    }

    fn respond<SCK: TargetedSend>(
        &self,
        socket: &SCK,
        reply_to: &SocketAddr,
        reply_from: &IpAddr,
    ) {
        let url = self.location_for(*reply_from);
        let result =
            socket.send_with(MAX_PACKET, reply_to, reply_from, |b| {
                message::build_response(
                    b,
                    self.interval.as_secs() as u32,
                    &self.advertisement.server,
                    &self.advertisement.unique_id,
                    url.as_str(),
                )
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "search response failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udp::Error;
    use mock_instant::MockClock;
    use std::sync::Mutex;

    struct FakeSocket {
        sends: Mutex<Vec<(SocketAddr, IpAddr, Vec<u8>)>>,
    }

    impl FakeSocket {
        fn new() -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
            }
        }

        fn take(&self) -> Vec<(SocketAddr, IpAddr, Vec<u8>)> {
            std::mem::take(&mut self.sends.lock().unwrap())
        }

        fn count(&self) -> usize {
            self.sends.lock().unwrap().len()
        }
    }

    impl TargetedSend for FakeSocket {
        fn send_with<F>(
            &self,
            size: usize,
            to: &SocketAddr,
            from: &IpAddr,
            f: F,
        ) -> Result<(), Error>
        where
            F: FnOnce(&mut [u8]) -> usize,
        {
            let mut buffer = vec![0u8; size];
            let n = f(&mut buffer);
            buffer.truncate(n);
            self.sends.lock().unwrap().push((*to, *from, buffer));
            Ok(())
        }
    }

    struct Fixture {
        engine: Engine,
        socket: FakeSocket,
    }

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));

    fn searcher() -> SocketAddr {
        "192.168.1.99:3000".parse().unwrap()
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: Engine::new(
                    Advertisement {
                        unique_id: "fedcba98-7654-5210-8000-0123456789ab"
                            .to_string(),
                        server: "Sensor/1.0".to_string(),
                        location: url::Url::parse(
                            "http://0.0.0.0:80/description.xml",
                        )
                        .unwrap(),
                    },
                    LOCAL,
                ),
                socket: FakeSocket::new(),
            }
        }

        fn search(&mut self, mx: &str) {
            let packet = format!(
                "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: {mx}\r\n\
ST: ssdp:all\r\n\
\r\n"
            );
            self.engine.on_data(
                packet.as_bytes(),
                LOCAL,
                searcher(),
            );
        }

        /// Advance mocked time one second at a time, waking each tick
        fn run_for(&mut self, secs: u64) {
            for _ in 0..secs {
                MockClock::advance(Duration::from_secs(1));
                self.engine.wakeup(&self.socket);
            }
        }
    }

    #[test]
    fn first_wakeup_announces() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        let sends = f.socket.take();
        assert_eq!(sends.len(), 1);
        let (to, from, body) = &sends[0];
        assert_eq!(
            *to,
            SocketAddr::V4(SocketAddrV4::new(GROUP, PORT))
        );
        assert_eq!(*from, LOCAL);
        let text = std::str::from_utf8(body).unwrap();
        assert!(text.starts_with("NOTIFY * HTTP/1.1\r\n"));
        assert!(text.contains("NTS: ssdp:alive\r\n"));
        assert!(text.contains(
            "LOCATION: http://192.168.1.10/description.xml\r\n"
        ));
    }

    #[test]
    fn announces_again_after_interval() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        assert_eq!(f.socket.take().len(), 1);

        f.run_for(1199);
        assert_eq!(f.socket.count(), 0);

        f.run_for(1);
        assert_eq!(f.socket.take().len(), 1);
    }

    #[test]
    fn malformed_datagrams_send_nothing() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();

        f.engine.on_data(b"GET / HTTP/1.1\r\n\r\n", LOCAL, searcher());
        f.engine.on_data(&[0, 1, 2, 3], LOCAL, searcher());
        f.engine.on_data(b"", LOCAL, searcher());
        f.run_for(10);
        assert_eq!(f.socket.count(), 0);
    }

    #[test]
    fn peer_notify_sends_nothing() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();

        f.engine.on_data(
            b"NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n\r\n",
            LOCAL,
            searcher(),
        );
        f.run_for(10);
        assert_eq!(f.socket.count(), 0);
    }

    #[test]
    fn search_gets_unicast_response() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();

        f.search("3");
        f.run_for(4); // delay is at most MX seconds
        let sends = f.socket.take();
        assert_eq!(sends.len(), 1);
        let (to, from, body) = &sends[0];
        assert_eq!(*to, searcher());
        assert_eq!(*from, LOCAL);
        let text = std::str::from_utf8(body).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("EXT:\r\n"));
        assert!(text.contains("ST: upnp:rootdevice\r\n"));
        assert!(text.contains(
            "USN: uuid:fedcba98-7654-5210-8000-0123456789ab\r\n"
        ));
        assert!(text.contains(
            "LOCATION: http://192.168.1.10/description.xml\r\n"
        ));
    }

    #[test]
    fn mx_zero_answers_at_next_wakeup() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();

        f.search("0");
        f.engine.wakeup(&f.socket);
        assert_eq!(f.socket.take().len(), 1);
    }

    #[test]
    fn newer_search_supersedes_older() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();

        f.search("3");
        f.search("3");
        f.search("3");
        f.run_for(4);
        assert_eq!(f.socket.take().len(), 1);
    }

    #[test]
    fn response_uses_arrival_address() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();

        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        f.engine.on_data(
            b"M-SEARCH * HTTP/1.1\r\nMX: 0\r\n\r\n",
            other,
            searcher(),
        );
        f.engine.wakeup(&f.socket);
        let sends = f.socket.take();
        assert_eq!(sends.len(), 1);
        let (_, from, body) = &sends[0];
        assert_eq!(*from, other);
        let text = std::str::from_utf8(body).unwrap();
        assert!(text
            .contains("LOCATION: http://10.0.0.7/description.xml\r\n"));
    }

    #[test]
    fn next_wakeup_is_zero_when_work_due() {
        let f = Fixture::new();
        assert_eq!(f.engine.next_wakeup(), Duration::ZERO);
    }

    #[test]
    fn next_wakeup_tracks_pending_response() {
        let mut f = Fixture::new();
        f.engine.wakeup(&f.socket);
        f.socket.take();
        assert!(f.engine.next_wakeup() > Duration::from_secs(1000));

        f.search("2");
        assert!(f.engine.next_wakeup() <= Duration::from_secs(2));
    }

    #[test]
    fn delay_stays_within_mx() {
        for _ in 0..1000 {
            assert!(response_delay(3) <= Duration::from_secs(3));
        }
    }

    #[test]
    fn delay_is_not_constant() {
        let first = response_delay(30);
        assert!((0..1000).any(|_| response_delay(30) != first));
    }

    #[test]
    fn delay_for_mx_zero_is_zero() {
        assert_eq!(response_delay(0), Duration::ZERO);
    }
}
