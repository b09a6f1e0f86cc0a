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

//! Behavioral latency-only network model.
//!
//! Routers form a torus over the configured dimensions and every router
//! hosts `concentration * interface_ports` terminals. A message is
//! delivered after `hop_latency` channel cycles per minimal hop plus one
//! cycle per flit of serialization; router internals are not modeled.
//! Addresses are mixed-radix `(c, d0, .., dk-1, i)` tuples with the
//! concentration component varying fastest.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, trace};
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};

use itertools::Itertools;

use crate::clock::{ClockId, CHANNEL_CLOCK};
use crate::component::{Component, Scope};
use crate::config::NetworkConfig;
use crate::error::Error;
use crate::message::Message;
use crate::sim::Simulator;
use crate::stats::TrafficLog;

use super::{Endpoint, EnrouteTally, Network};

const DELIVER_EVT: i32 = 0xD1;

pub struct LatencyNetwork {
    scope: Scope,
    sim: Rc<Simulator>,
    channel_clock: ClockId,
    dimensions: Vec<u32>,
    concentration: u32,
    interface_ports: u32,
    hop_latency: u64,
    /// Minimal hop counts between every router pair.
    hops: Vec<Vec<u32>>,
    endpoints: RefCell<HashMap<u32, Rc<RefCell<dyn Endpoint>>>>,
    pump: RefCell<Option<Rc<RefCell<Pump>>>>,
    traffic_log: Rc<RefCell<dyn TrafficLog>>,
    next_message_id: Cell<u64>,
    tally: Cell<EnrouteTally>,
}

/// Event target that hands delivery events back to the network.
struct Pump {
    scope: Scope,
    network: Weak<LatencyNetwork>,
}

impl Component for Pump {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn process_event(&mut self, payload: Option<Box<dyn Any>>, kind: i32) {
        match kind {
            DELIVER_EVT => {
                let message = payload
                    .expect("delivery without a message")
                    .downcast::<Message>()
                    .expect("delivery payload is not a message");
                let network = self.network.upgrade().expect("network dropped");
                network.deliver(*message);
            }
            _ => panic!("{}: unknown event kind {:#x}", self.scope, kind),
        }
    }
}

impl LatencyNetwork {
    pub fn new(
        sim: &Rc<Simulator>,
        config: &NetworkConfig,
        traffic_log: Rc<RefCell<dyn TrafficLog>>,
        scope: &Scope,
    ) -> Result<Rc<Self>, Error> {
        if config.dimensions.is_empty() || config.dimensions.iter().any(|&w| w == 0) {
            return Err(Error::InvalidSetting(
                "network dimensions must be nonzero".to_string(),
            ));
        }
        if config.concentration == 0 || config.interface_ports == 0 {
            return Err(Error::InvalidSetting(
                "concentration and interface_ports must be nonzero".to_string(),
            ));
        }
        let channel_clock = sim.clock(CHANNEL_CLOCK).ok_or_else(|| {
            Error::InvalidSetting(format!("no '{}' clock registered", CHANNEL_CLOCK))
        })?;

        let hops = router_hops(&config.dimensions);

        let network = Rc::new(Self {
            scope: scope.clone(),
            sim: sim.clone(),
            channel_clock,
            dimensions: config.dimensions.clone(),
            concentration: config.concentration,
            interface_ports: config.interface_ports,
            hop_latency: config.hop_latency,
            hops,
            endpoints: RefCell::new(HashMap::new()),
            pump: RefCell::new(None),
            traffic_log,
            next_message_id: Cell::new(0),
            tally: Cell::new(EnrouteTally::default()),
        });

        let pump = Rc::new(RefCell::new(Pump {
            scope: scope.child("pump"),
            network: Rc::downgrade(&network),
        }));
        sim.register_component(&pump);
        *network.pump.borrow_mut() = Some(pump);

        debug!(
            "{}: {} routers, {} interfaces",
            network.scope,
            network.num_routers(),
            network.num_interfaces()
        );
        Ok(network)
    }

    fn radix(&self) -> Vec<u32> {
        let mut radix = Vec::with_capacity(self.dimensions.len() + 2);
        radix.push(self.concentration);
        radix.extend_from_slice(&self.dimensions);
        radix.push(self.interface_ports);
        radix
    }

    /// Linear router id of an interface address.
    fn router_of(&self, address: &[u32]) -> usize {
        let mut router = 0usize;
        for (d, &width) in self.dimensions.iter().enumerate().rev() {
            router = router * width as usize + address[d + 1] as usize;
        }
        router
    }

    fn deliver(&self, message: Message) {
        let mut tally = self.tally.get();
        tally.messages -= 1;
        tally.packets -= message.num_packets();
        tally.flits -= message.num_flits();
        self.tally.set(tally);

        trace!("{}: delivering {}", self.scope, message);
        self.traffic_log.borrow_mut().log(
            &self.scope.path(),
            0,
            message.protocol_class,
            0,
            message.protocol_class,
            message.num_flits(),
        );

        let source = self
            .endpoints
            .borrow()
            .get(&message.source)
            .cloned()
            .expect("message from an unregistered interface");
        let destination = self
            .endpoints
            .borrow()
            .get(&message.destination)
            .cloned()
            .expect("message to an unregistered interface");

        source.borrow_mut().handle_delivered_message(&message);
        destination.borrow_mut().handle_received_message(message);
    }
}

impl Network for LatencyNetwork {
    fn num_interfaces(&self) -> u32 {
        self.radix().iter().product()
    }

    fn num_routers(&self) -> u32 {
        self.dimensions.iter().product()
    }

    fn translate_interface_id_to_address(&self, id: u32) -> Vec<u32> {
        assert!(id < self.num_interfaces(), "interface {} out of range", id);
        let mut remainder = id;
        let mut address = Vec::with_capacity(self.dimensions.len() + 2);
        for width in self.radix() {
            address.push(remainder % width);
            remainder /= width;
        }
        address
    }

    fn translate_interface_address_to_id(&self, address: &[u32]) -> u32 {
        let radix = self.radix();
        assert_eq!(address.len(), radix.len(), "malformed interface address");
        let mut id = 0;
        for (component, width) in address.iter().zip(&radix).rev() {
            assert!(component < width, "address component out of range");
            id = id * width + component;
        }
        id
    }

    fn compute_minimal_hops(&self, source: &[u32], destination: &[u32]) -> u32 {
        self.hops[self.router_of(source)][self.router_of(destination)]
    }

    fn register_endpoint(&self, id: u32, endpoint: Rc<RefCell<dyn Endpoint>>) {
        assert!(id < self.num_interfaces(), "interface {} out of range", id);
        let previous = self.endpoints.borrow_mut().insert(id, endpoint);
        assert!(previous.is_none(), "interface {} registered twice", id);
    }

    fn send_message(&self, mut message: Message, destination: u32) -> u64 {
        let id = self.next_message_id.get();
        self.next_message_id.set(id + 1);
        message.id = id;
        message.destination = destination;

        let mut tally = self.tally.get();
        tally.messages += 1;
        tally.packets += message.num_packets();
        tally.flits += message.num_flits();
        self.tally.set(tally);

        let source = self.translate_interface_id_to_address(message.source);
        let dest = self.translate_interface_id_to_address(destination);
        let hops = self.compute_minimal_hops(&source, &dest) as u64;
        let cycles = (self.hop_latency * hops + message.num_flits() as u64).max(1);
        let arrival = self.sim.future_cycle(self.channel_clock, cycles);

        trace!(
            "{}: accepted {} for delivery at {}ps ({} hops)",
            self.scope,
            message,
            arrival,
            hops
        );
        let pump = self.pump.borrow().clone().expect("network pump missing");
        self.sim
            .schedule(arrival, 0, pump, Some(Box::new(message)), DELIVER_EVT);
        id
    }

    fn enroute_count(&self) -> EnrouteTally {
        self.tally.get()
    }
}

/// All-pairs minimal hop counts of a torus over `dimensions`.
fn router_hops(dimensions: &[u32]) -> Vec<Vec<u32>> {
    let num_routers: usize = dimensions.iter().product::<u32>() as usize;
    let mut graph: UnGraph<u32, ()> = UnGraph::with_capacity(num_routers, num_routers * 2);
    for r in 0..num_routers {
        graph.add_node(r as u32);
    }

    let widths: Vec<usize> = dimensions.iter().map(|&w| w as usize).collect();
    for coords in widths.iter().map(|&w| 0..w).multi_cartesian_product() {
        for (d, &width) in widths.iter().enumerate() {
            if width < 2 {
                continue;
            }
            // With a width of two the wraparound would duplicate the edge.
            if width == 2 && coords[d] == 1 {
                continue;
            }
            let mut neighbor = coords.clone();
            neighbor[d] = (coords[d] + 1) % width;
            let src = linearize(&coords, &widths);
            let dst = linearize(&neighbor, &widths);
            graph.add_edge(NodeIndex::new(src), NodeIndex::new(dst), ());
        }
    }

    let mut hops = vec![vec![0u32; num_routers]; num_routers];
    for r in 0..num_routers {
        let distances = dijkstra(&graph, NodeIndex::new(r), None, |_| 1u32);
        for (node, distance) in distances {
            hops[r][node.index()] = distance;
        }
    }
    hops
}

fn linearize(coords: &[usize], widths: &[usize]) -> usize {
    let mut index = 0;
    for (d, &c) in coords.iter().enumerate().rev() {
        index = index * widths[d] + c;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::NullTrafficLog;

    fn network(dimensions: Vec<u32>, concentration: u32) -> (Rc<Simulator>, Rc<LatencyNetwork>) {
        let sim = Simulator::new(1);
        sim.register_clock(CHANNEL_CLOCK, 1_000);
        let config = NetworkConfig {
            dimensions,
            concentration,
            interface_ports: 1,
            hop_latency: 2,
        };
        let traffic_log = Rc::new(RefCell::new(NullTrafficLog));
        let net =
            LatencyNetwork::new(&sim, &config, traffic_log, &Scope::root("network")).unwrap();
        (sim, net)
    }

    #[test]
    fn address_translation_round_trips() {
        let (_sim, net) = network(vec![3, 3, 3], 4);
        assert_eq!(net.num_routers(), 27);
        assert_eq!(net.num_interfaces(), 108);
        for id in 0..net.num_interfaces() {
            let address = net.translate_interface_id_to_address(id);
            assert_eq!(address.len(), 5);
            assert_eq!(net.translate_interface_address_to_id(&address), id);
        }
    }

    #[test]
    fn torus_hop_counts() {
        let (_sim, net) = network(vec![4, 4], 1);
        let a = net.translate_interface_id_to_address(0); // router (0, 0)
        let b = net.translate_interface_id_to_address(3); // router (3, 0)
        let c = net.translate_interface_id_to_address(5); // router (1, 1)
        assert_eq!(net.compute_minimal_hops(&a, &a), 0);
        // Wraparound makes (0,0) -> (3,0) a single hop.
        assert_eq!(net.compute_minimal_hops(&a, &b), 1);
        assert_eq!(net.compute_minimal_hops(&a, &c), 2);
        assert_eq!(
            net.compute_minimal_hops(&a, &c),
            net.compute_minimal_hops(&c, &a)
        );
    }

    struct Recorder {
        delivered: Vec<u64>,
        received: Vec<(u64, u32)>,
    }

    impl Endpoint for Recorder {
        fn handle_delivered_message(&mut self, message: &Message) {
            self.delivered.push(message.id);
        }
        fn handle_received_message(&mut self, message: Message) {
            self.received.push((message.id, message.num_flits()));
        }
    }

    #[test]
    fn delivery_reaches_both_endpoints() {
        let (sim, net) = network(vec![2, 2], 1);
        let endpoints: Vec<Rc<RefCell<Recorder>>> = (0..4)
            .map(|id| {
                let ep = Rc::new(RefCell::new(Recorder {
                    delivered: Vec::new(),
                    received: Vec::new(),
                }));
                net.register_endpoint(id, ep.clone());
                ep
            })
            .collect();

        let mut message = Message::new(0xFA, 0, 1, 6, 4);
        message.source = 0;
        let id = net.send_message(message, 3);
        assert_eq!(net.enroute_count().messages, 1);
        assert_eq!(net.enroute_count().flits, 6);

        sim.run();

        assert_eq!(net.enroute_count(), EnrouteTally::default());
        assert_eq!(endpoints[0].borrow().delivered, vec![id]);
        assert_eq!(endpoints[3].borrow().received, vec![(id, 6)]);
        // Two hops at latency 2 plus six flits of serialization.
        assert_eq!(sim.current_time(), 10 * 1_000);
    }

    #[test]
    fn self_send_delivers_to_one_endpoint() {
        let (sim, net) = network(vec![2], 1);
        let ep = Rc::new(RefCell::new(Recorder {
            delivered: Vec::new(),
            received: Vec::new(),
        }));
        net.register_endpoint(0, ep.clone());
        net.register_endpoint(1, Rc::new(RefCell::new(Recorder {
            delivered: Vec::new(),
            received: Vec::new(),
        })));

        let mut message = Message::new(0xFA, 0, 1, 1, 4);
        message.source = 0;
        net.send_message(message, 0);
        sim.run();

        assert_eq!(ep.borrow().delivered.len(), 1);
        assert_eq!(ep.borrow().received.len(), 1);
    }
}
