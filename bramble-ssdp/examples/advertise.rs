//! Announce a (pretend) device and answer searches, once a second.
//!
//! Run with the interface address to advertise on:
//!
//! ```text
//! advertise 192.168.1.10
//! ```

use bramble_ssdp::udp::std::MulticastSocket;
use bramble_ssdp::udp::TargetedReceive;
use bramble_ssdp::{Advertisement, Engine};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let local_ip: Ipv4Addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1".to_string())
        .parse()?;

    let socket = MulticastSocket::bind(
        Ipv4Addr::new(239, 255, 255, 250),
        1900,
        local_ip,
    )?;

    let mut engine = Engine::new(
        Advertisement {
            unique_id: "0bfc0ff3-0000-5000-8000-000000000001".to_string(),
            server: "Demo/1.0".to_string(),
            location: url::Url::parse(
                "http://0.0.0.0:80/description.xml",
            )?,
        },
        IpAddr::V4(local_ip),
    );

    let mut buf = [0u8; 1500];
    loop {
        engine.wakeup(&socket);
        // drain anything that arrived, then sleep out the tick
        while let Ok((n, wasto, wasfrom)) =
            socket.receive_to(&mut buf)
        {
            engine.on_data(&buf[0..n], wasto, wasfrom);
        }
        std::thread::sleep(
            engine.next_wakeup().min(Duration::from_secs(1)),
        );
    }
}
