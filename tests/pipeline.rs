//! Bytes from the transceiver in, bridge requests out.
//!
//! Drives decoder, router and dispatchers the way the gateway does, with
//! in-memory links standing in for the bridges.

use std::net::Ipv4Addr;

use enocean_hue::dispatch::request;
use enocean_hue::protocol::encode_packet;
use enocean_hue::{
    BridgeConfig, CommandMapper, Dispatcher, MemoryLink, PacketDecoder, PacketType, RouteOutcome,
    Router, Timestamp,
};

/// Top left button of switch aa:bb:cc:dd pressed.
const PRESS: [u8; 21] = [
    0x55, 0x00, 0x07, 0x07, 0x01, 0x7a, 0xf6, 0x30, 0xaa, 0xbb, 0xcc, 0xdd, 0x30, 0x01, 0xff,
    0xff, 0xff, 0xff, 0x2d, 0x00, 0xfd,
];

/// Switch aa:bb:cc:dd released.
const RELEASE: [u8; 21] = [
    0x55, 0x00, 0x07, 0x07, 0x01, 0x7a, 0xf6, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0x20, 0x01, 0xff,
    0xff, 0xff, 0xff, 0x2d, 0x00, 0x4b,
];

struct Pipeline {
    decoder: PacketDecoder,
    router: Router,
    dispatchers: Vec<Dispatcher<MemoryLink>>,
}

impl Pipeline {
    fn new(rules: &str, links: Vec<MemoryLink>) -> Self {
        let dispatchers = links
            .into_iter()
            .enumerate()
            .map(|(i, link)| {
                let bridge = BridgeConfig::new(Ipv4Addr::new(192, 168, 1, i as u8 + 1), "key", 36);
                Dispatcher::new(bridge, link)
            })
            .collect();
        Self {
            decoder: PacketDecoder::new(),
            router: Router::new(CommandMapper::from_rules(rules).unwrap()),
            dispatchers,
        }
    }

    fn feed(&mut self, bytes: &[u8], now: Timestamp) -> Vec<RouteOutcome> {
        self.decoder.feed(bytes);
        let mut outcomes = Vec::new();
        while let Some(packet) = self.decoder.decode() {
            outcomes.push(
                self.router
                    .handle_packet(&packet, now, &mut self.dispatchers),
            );
        }
        for dispatcher in &mut self.dispatchers {
            dispatcher.poll(now);
        }
        outcomes
    }

    fn connect_all(&mut self, now: Timestamp) {
        while self.dispatchers.iter().any(|d| !d.is_idle()) {
            for dispatcher in &mut self.dispatchers {
                dispatcher.link_mut().complete_connect();
                dispatcher.poll(now);
            }
        }
    }

    fn posted(&self, bridge: usize) -> Vec<i32> {
        self.dispatchers[bridge - 1].link().posted_values()
    }
}

fn press(button_state: u8) -> Vec<u8> {
    encode_packet(
        PacketType::RadioErp1,
        &[0xf6, button_state, 0xaa, 0xbb, 0xcc, 0xdd, 0x30],
        &[],
    )
    .to_vec()
}

#[test]
fn test_press_posts_mapped_value_once() {
    let mut pipeline = Pipeline::new(
        "bridge 1\naa:bb:cc:dd 1 10",
        vec![MemoryLink::new(), MemoryLink::new()],
    );

    assert_eq!(pipeline.feed(&PRESS, 0), vec![RouteOutcome::Forwarded(1)]);
    assert_eq!(pipeline.posted(1), vec![10]);
    assert!(pipeline.posted(2).is_empty());

    let bridge = pipeline.dispatchers[0].bridge().clone();
    assert_eq!(
        pipeline.dispatchers[0].link().requests(),
        &[request::build(&bridge, 10)]
    );
}

#[test]
fn test_noise_and_byte_by_byte_delivery() {
    let mut pipeline = Pipeline::new("aa:bb:cc:dd 1 10", vec![MemoryLink::new()]);
    let mut stream = vec![0x00, 0x55, 0x13, 0x55, 0x55, 0xff];
    stream.extend_from_slice(&PRESS);

    let outcomes: Vec<RouteOutcome> = stream
        .iter()
        .flat_map(|&b| pipeline.feed(&[b], 0))
        .collect();
    assert_eq!(outcomes, vec![RouteOutcome::Forwarded(1)]);
    assert_eq!(pipeline.posted(1), vec![10]);
}

#[test]
fn test_corrupted_frame_is_dropped() {
    let mut pipeline = Pipeline::new("aa:bb:cc:dd 1 10", vec![MemoryLink::new()]);

    let mut corrupted = PRESS;
    corrupted[9] ^= 0x01;
    assert!(pipeline.feed(&corrupted, 0).is_empty());
    assert_eq!(pipeline.feed(&PRESS, 0), vec![RouteOutcome::Forwarded(1)]);
    assert_eq!(pipeline.posted(1), vec![10]);
}

#[test]
fn test_release_toggles_value() {
    let mut pipeline = Pipeline::new("aa:bb:cc:dd 1 10", vec![MemoryLink::new()]);

    pipeline.feed(&PRESS, 0);
    pipeline.feed(&RELEASE, 80);
    assert_eq!(pipeline.posted(1), vec![10, -10]);
}

#[test]
fn test_explicit_release_value() {
    let mut pipeline = Pipeline::new("aa:bb:cc:dd -2 100", vec![MemoryLink::new()]);

    pipeline.feed(&PRESS, 0);
    pipeline.feed(&RELEASE, 80);
    assert_eq!(pipeline.posted(1), vec![101, 100]);
}

#[test]
fn test_repeated_telegram_is_suppressed() {
    let mut pipeline = Pipeline::new("aa:bb:cc:dd 1 10", vec![MemoryLink::new()]);

    assert_eq!(pipeline.feed(&PRESS, 1000), vec![RouteOutcome::Forwarded(1)]);
    assert_eq!(pipeline.feed(&PRESS, 1100), vec![RouteOutcome::Suppressed]);
    assert_eq!(pipeline.feed(&PRESS, 1300), vec![RouteOutcome::Forwarded(1)]);
    assert_eq!(pipeline.posted(1), vec![10, 10]);
}

#[test]
fn test_unmapped_switch() {
    let mut pipeline = Pipeline::new("01:02:03:04 1 10", vec![MemoryLink::new()]);
    assert_eq!(pipeline.feed(&PRESS, 0), vec![RouteOutcome::Unmapped]);
    assert!(pipeline.posted(1).is_empty());
}

#[test]
fn test_busy_bridge_keeps_latest_commands() {
    let mut pipeline = Pipeline::new(
        "aa:bb:cc:dd -1 100",
        vec![MemoryLink::new().deferred_connect()],
    );

    for state in [0x30, 0x10, 0x70, 0x50, 0x37, 0x15] {
        pipeline.feed(&press(state), 0);
    }
    let queued: Vec<i32> = pipeline.dispatchers[0].queued().map(|c| c.value).collect();
    assert_eq!(queued, vec![103, 104, 105, 106]);

    pipeline.connect_all(100);
    assert_eq!(pipeline.posted(1), vec![101, 103, 104, 105, 106]);
}

#[test]
fn test_stale_commands_are_not_sent() {
    let mut pipeline = Pipeline::new(
        "aa:bb:cc:dd -1 100",
        vec![MemoryLink::new().deferred_connect()],
    );

    pipeline.feed(&press(0x30), 0);
    pipeline.feed(&press(0x10), 100);
    pipeline.feed(&press(0x70), 700);

    pipeline.connect_all(1000);
    assert_eq!(pipeline.posted(1), vec![101, 103]);
    assert_eq!(pipeline.dispatchers[0].stats().dropped, 1);
}
