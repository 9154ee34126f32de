//! Routing of decoded telegrams to bridge dispatchers.
//!
//! The same telegram often arrives more than once: switches repeat their
//! telegrams and repeaters forward copies. A value already forwarded for a
//! sensor is not forwarded again within [`DEDUP_WINDOW_MS`].

use std::collections::HashMap;

use crate::clock::Timestamp;
use crate::dispatch::{Dispatcher, Link};
use crate::mapping::CommandMapper;
use crate::protocol::Packet;
use crate::types::{SensorId, Telegram};

/// Window in which an identical value from the same sensor is suppressed.
pub const DEDUP_WINDOW_MS: u64 = 200;

/// What happened to a telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not a telegram the gateway understands.
    Ignored,
    /// No command mapped.
    Unmapped,
    /// Same value forwarded for this sensor moments ago.
    Suppressed,
    /// Posted to this many bridges.
    Forwarded(usize),
}

/// Routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Packets received.
    pub packets: u64,
    /// Packets that were not understood.
    pub ignored: u64,
    /// Telegrams decoded.
    pub telegrams: u64,
    /// Telegrams without a command.
    pub unmapped: u64,
    /// Commands suppressed as duplicates.
    pub suppressed: u64,
    /// Commands forwarded.
    pub forwarded: u64,
}

/// Maps telegrams to commands and hands them to the selected dispatchers.
#[derive(Debug)]
pub struct Router {
    mapper: CommandMapper,
    last_forwarded: HashMap<SensorId, (Timestamp, i32)>,
    stats: RouterStats,
}

impl Router {
    /// Creates a router using `mapper`.
    #[must_use]
    pub fn new(mapper: CommandMapper) -> Self {
        Self {
            mapper,
            last_forwarded: HashMap::new(),
            stats: RouterStats::default(),
        }
    }

    /// Returns the command mapper.
    #[must_use]
    pub const fn mapper(&self) -> &CommandMapper {
        &self.mapper
    }

    /// Returns the command mapper mutably, e.g. to reload rules.
    pub const fn mapper_mut(&mut self) -> &mut CommandMapper {
        &mut self.mapper
    }

    /// Returns the routing counters.
    #[must_use]
    pub const fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Decodes a packet and routes the telegram it carries.
    pub fn handle_packet<L: Link>(
        &mut self,
        packet: &Packet,
        now: Timestamp,
        dispatchers: &mut [Dispatcher<L>],
    ) -> RouteOutcome {
        self.stats.packets += 1;
        tracing::debug!(
            "packet #{} {:?}: {} | {}",
            self.stats.packets,
            packet.packet_type(),
            hex::encode(packet.data()),
            hex::encode(packet.optional_data())
        );

        match Telegram::from_packet(packet) {
            Some(telegram) => self.handle_telegram(&telegram, now, dispatchers),
            None => {
                self.stats.ignored += 1;
                RouteOutcome::Ignored
            }
        }
    }

    /// Routes a telegram.
    ///
    /// Bridges are numbered from 1 in the order of `dispatchers`.
    pub fn handle_telegram<L: Link>(
        &mut self,
        telegram: &Telegram,
        now: Timestamp,
        dispatchers: &mut [Dispatcher<L>],
    ) -> RouteOutcome {
        self.stats.telegrams += 1;
        tracing::debug!("telegram #{}: {}", self.stats.telegrams, telegram);

        let Some(entry) = self.mapper.lookup(telegram) else {
            self.stats.unmapped += 1;
            tracing::debug!("no command for {}", telegram);
            return RouteOutcome::Unmapped;
        };

        let sender = telegram.sender();
        if let Some(&(last, value)) = self.last_forwarded.get(&sender) {
            if value == entry.value && now.saturating_sub(last) < DEDUP_WINDOW_MS {
                self.stats.suppressed += 1;
                tracing::debug!(
                    "{}: {} already sent {} ms ago",
                    sender,
                    value,
                    now.saturating_sub(last)
                );
                return RouteOutcome::Suppressed;
            }
        }
        self.last_forwarded.insert(sender, (now, entry.value));

        let mut posted = 0;
        for (index, dispatcher) in dispatchers.iter_mut().enumerate() {
            if entry.destination.selects(index + 1, dispatcher.bridge().group) {
                dispatcher.post(entry.value, now);
                posted += 1;
            }
        }

        self.stats.forwarded += 1;
        if posted == 0 {
            tracing::warn!("{}: no configured bridge in {}", sender, entry.destination);
        } else {
            tracing::info!("{}: sending {} to {}", telegram, entry.value, entry.destination);
        }
        RouteOutcome::Forwarded(posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::dispatch::MemoryLink;
    use crate::protocol::{PacketDecoder, PacketType, encode_packet};
    use std::net::Ipv4Addr;

    const SWITCH: SensorId = SensorId::new([0xaa, 0xbb, 0xcc, 0xdd]);
    const CONTACT: SensorId = SensorId::new([0x01, 0x02, 0x03, 0x04]);

    fn dispatchers(groups: &[Option<u8>]) -> Vec<Dispatcher<MemoryLink>> {
        groups
            .iter()
            .enumerate()
            .map(|(i, group)| {
                let mut bridge =
                    BridgeConfig::new(Ipv4Addr::new(10, 0, 0, i as u8 + 1), "key", 1);
                bridge.group = *group;
                Dispatcher::new(bridge, MemoryLink::new())
            })
            .collect()
    }

    fn values(dispatchers: &[Dispatcher<MemoryLink>]) -> Vec<Vec<i32>> {
        dispatchers.iter().map(|d| d.link().posted_values()).collect()
    }

    fn press(button: u8) -> Telegram {
        Telegram::Switch {
            sender: SWITCH,
            button,
            pressed: true,
        }
    }

    fn release() -> Telegram {
        Telegram::Switch {
            sender: SWITCH,
            button: 0,
            pressed: false,
        }
    }

    fn contact(closed: bool) -> Telegram {
        Telegram::Contact {
            sender: CONTACT,
            closed,
        }
    }

    fn router(rules: &str) -> Router {
        Router::new(CommandMapper::from_rules(rules).unwrap())
    }

    #[test]
    fn test_forward_to_all_bridges() {
        let mut router = router("aa:bb:cc:dd 1 10");
        let mut ds = dispatchers(&[None, None, None]);

        assert_eq!(
            router.handle_telegram(&press(1), 0, &mut ds),
            RouteOutcome::Forwarded(3)
        );
        assert_eq!(values(&ds), vec![vec![10], vec![10], vec![10]]);
    }

    #[test]
    fn test_forward_to_selected_bridges() {
        let mut router = router("bridge 2\naa:bb:cc:dd 1 10\nbridge 1 3\naa:bb:cc:dd 2 20");
        let mut ds = dispatchers(&[None, None, None]);

        router.handle_telegram(&press(1), 0, &mut ds);
        router.handle_telegram(&press(2), 1000, &mut ds);
        assert_eq!(values(&ds), vec![vec![20], vec![10], vec![20]]);
    }

    #[test]
    fn test_forward_to_group() {
        let mut router = router("group 7\naa:bb:cc:dd 1 10");
        let mut ds = dispatchers(&[Some(7), None, Some(3), Some(7)]);

        assert_eq!(
            router.handle_telegram(&press(1), 0, &mut ds),
            RouteOutcome::Forwarded(2)
        );
        assert_eq!(values(&ds), vec![vec![10], vec![], vec![], vec![10]]);
    }

    #[test]
    fn test_missing_bridge() {
        let mut router = router("bridge 5\naa:bb:cc:dd 1 10");
        let mut ds = dispatchers(&[None, None]);
        assert_eq!(
            router.handle_telegram(&press(1), 0, &mut ds),
            RouteOutcome::Forwarded(0)
        );
    }

    #[test]
    fn test_duplicates_suppressed_within_window() {
        let mut router = router("01:02:03:04 1 5");
        let mut ds = dispatchers(&[None]);

        assert_eq!(
            router.handle_telegram(&contact(true), 1000, &mut ds),
            RouteOutcome::Forwarded(1)
        );
        assert_eq!(
            router.handle_telegram(&contact(true), 1199, &mut ds),
            RouteOutcome::Suppressed
        );
        // The window starts at the last forwarded telegram
        assert_eq!(
            router.handle_telegram(&contact(true), 1200, &mut ds),
            RouteOutcome::Forwarded(1)
        );
        assert_eq!(values(&ds), vec![vec![5, 5]]);
        assert_eq!(router.stats().suppressed, 1);
        assert_eq!(router.stats().telegrams, 3);
    }

    #[test]
    fn test_different_value_not_suppressed() {
        let mut router = router("aa:bb:cc:dd 1 10\naa:bb:cc:dd 2 20");
        let mut ds = dispatchers(&[None]);

        router.handle_telegram(&press(1), 0, &mut ds);
        assert_eq!(
            router.handle_telegram(&press(2), 10, &mut ds),
            RouteOutcome::Forwarded(1)
        );
        assert_eq!(values(&ds), vec![vec![10, 20]]);
    }

    #[test]
    fn test_dedup_is_per_sensor() {
        let mut router = router("aa:bb:cc:dd 1 5\n01:02:03:04 1 5");
        let mut ds = dispatchers(&[None]);

        router.handle_telegram(&press(1), 0, &mut ds);
        assert_eq!(
            router.handle_telegram(&contact(true), 10, &mut ds),
            RouteOutcome::Forwarded(1)
        );
    }

    #[test]
    fn test_press_and_release_toggle() {
        let mut router = router("aa:bb:cc:dd 1 10");
        let mut ds = dispatchers(&[None]);

        router.handle_telegram(&press(1), 0, &mut ds);
        assert_eq!(
            router.handle_telegram(&release(), 50, &mut ds),
            RouteOutcome::Forwarded(1)
        );
        // A repeated release has nothing left to toggle
        assert_eq!(
            router.handle_telegram(&release(), 60, &mut ds),
            RouteOutcome::Unmapped
        );
        assert_eq!(values(&ds), vec![vec![10, -10]]);
    }

    #[test]
    fn test_handle_packet() {
        let mut router = router("aa:bb:cc:dd 1 10");
        let mut ds = dispatchers(&[None]);
        let mut decoder = PacketDecoder::new();

        decoder.feed(&encode_packet(
            PacketType::RadioErp1,
            &[0xf6, 0x30, 0xaa, 0xbb, 0xcc, 0xdd, 0x30],
            &[0x01, 0xff, 0xff, 0xff, 0xff, 0x2d, 0x00],
        ));
        decoder.feed(&encode_packet(PacketType::Event, &[0x02], &[]));

        let packet = decoder.decode().unwrap();
        assert_eq!(
            router.handle_packet(&packet, 0, &mut ds),
            RouteOutcome::Forwarded(1)
        );
        let packet = decoder.decode().unwrap();
        assert_eq!(
            router.handle_packet(&packet, 0, &mut ds),
            RouteOutcome::Ignored
        );
        assert_eq!(router.stats().packets, 2);
        assert_eq!(router.stats().ignored, 1);
        assert_eq!(router.stats().telegrams, 1);
    }
}
