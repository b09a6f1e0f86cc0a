// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Messages, packets, and flits.
//!
//! A message owns its packets and a packet owns its flits, so the whole
//! tree moves as one value: the sender hands it to the network at
//! `send_message` and the receiver consumes it after delivery.

use std::fmt;

#[derive(Debug)]
pub struct Flit {
    pub index: u32,
    pub head: bool,
    pub tail: bool,
}

#[derive(Debug)]
pub struct Packet {
    pub index: u32,
    flits: Vec<Flit>,
}

impl Packet {
    fn new(index: u32, length: u32) -> Self {
        assert!(length > 0, "packets must carry at least one flit");
        let flits = (0..length)
            .map(|f| Flit {
                index: f,
                head: f == 0,
                tail: f == length - 1,
            })
            .collect();
        Self { index, flits }
    }

    pub fn num_flits(&self) -> u32 {
        self.flits.len() as u32
    }

    pub fn flits(&self) -> &[Flit] {
        &self.flits
    }
}

#[derive(Debug)]
pub struct Message {
    /// Assigned by the network at send time.
    pub id: u64,
    /// Interface id of the sender, set by the sending terminal.
    pub source: u32,
    /// Interface id of the receiver, set by the network at send time.
    pub destination: u32,
    pub opcode: u32,
    pub protocol_class: u32,
    pub transaction: u64,
    packets: Vec<Packet>,
}

impl Message {
    /// Split `message_size` flits into packets of at most
    /// `max_packet_size` flits, each framed by one head and one tail.
    pub fn new(
        opcode: u32,
        protocol_class: u32,
        transaction: u64,
        message_size: u32,
        max_packet_size: u32,
    ) -> Self {
        assert!(message_size > 0, "messages must carry at least one flit");
        assert!(max_packet_size > 0, "max packet size must be nonzero");

        let num_packets = message_size.div_ceil(max_packet_size);
        let mut packets = Vec::with_capacity(num_packets as usize);
        let mut flits_left = message_size;
        for p in 0..num_packets {
            let length = flits_left.min(max_packet_size);
            packets.push(Packet::new(p, length));
            flits_left -= length;
        }
        assert_eq!(flits_left, 0);

        Self {
            id: u64::MAX,
            source: u32::MAX,
            destination: u32::MAX,
            opcode,
            protocol_class,
            transaction,
            packets,
        }
    }

    pub fn num_packets(&self) -> u32 {
        self.packets.len() as u32
    }

    pub fn num_flits(&self) -> u32 {
        self.packets.iter().map(Packet::num_flits).sum()
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "message {} trans {:#x} {}->{} ({} packets, {} flits)",
            self.id,
            self.transaction,
            self.source,
            self.destination,
            self.num_packets(),
            self.num_flits()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_framing(message: &Message, message_size: u32, max_packet_size: u32) {
        assert_eq!(message.num_flits(), message_size);
        assert_eq!(message.num_packets(), message_size.div_ceil(max_packet_size));
        for packet in message.packets() {
            assert!(packet.num_flits() <= max_packet_size);
            let heads = packet.flits().iter().filter(|f| f.head).count();
            let tails = packet.flits().iter().filter(|f| f.tail).count();
            assert_eq!(heads, 1);
            assert_eq!(tails, 1);
            assert!(packet.flits()[0].head);
            assert!(packet.flits().last().unwrap().tail);
        }
    }

    #[test]
    fn exact_multiple_of_packet_size() {
        let m = Message::new(0xFA, 0, 7, 12, 4);
        check_framing(&m, 12, 4);
        assert_eq!(m.num_packets(), 3);
    }

    #[test]
    fn trailing_short_packet() {
        let m = Message::new(0xFA, 0, 7, 10, 4);
        check_framing(&m, 10, 4);
        assert_eq!(m.num_packets(), 3);
        assert_eq!(m.packets()[2].num_flits(), 2);
    }

    #[test]
    fn single_flit_message() {
        let m = Message::new(0x82, 1, 9, 1, 16);
        check_framing(&m, 1, 16);
        let flit = &m.packets()[0].flits()[0];
        assert!(flit.head && flit.tail);
    }

    #[test]
    #[should_panic(expected = "at least one flit")]
    fn zero_size_is_fatal() {
        Message::new(0xFA, 0, 7, 0, 4);
    }
}
