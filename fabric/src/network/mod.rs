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

//! The network boundary.
//!
//! The workload core only talks to a [`Network`] trait object: it sends
//! owned messages and is later re-entered through [`Endpoint`]
//! callbacks. Delivery notifies the source with a borrow; the
//! destination consumes the message.

mod latency;

pub use latency::LatencyNetwork;

use std::cell::RefCell;
use std::rc::Rc;

use crate::message::Message;

/// In-flight counts sampled by warmup detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrouteTally {
    pub messages: u32,
    pub packets: u32,
    pub flits: u32,
}

/// A terminal as the network sees it.
pub trait Endpoint {
    /// The message this endpoint sent has reached its destination.
    fn handle_delivered_message(&mut self, message: &Message);
    /// A message addressed to this endpoint has arrived; the endpoint
    /// owns it from here.
    fn handle_received_message(&mut self, message: Message);
}

pub trait Network {
    fn num_interfaces(&self) -> u32;
    fn num_routers(&self) -> u32;
    /// The address tuple of an interface id.
    fn translate_interface_id_to_address(&self, id: u32) -> Vec<u32>;
    fn translate_interface_address_to_id(&self, address: &[u32]) -> u32;
    fn compute_minimal_hops(&self, source: &[u32], destination: &[u32]) -> u32;
    /// Attach the endpoint that will receive callbacks for `id`.
    fn register_endpoint(&self, id: u32, endpoint: Rc<RefCell<dyn Endpoint>>);
    /// Accept ownership of `message` for asynchronous delivery.
    /// Returns the message id assigned by the network.
    fn send_message(&self, message: Message, destination: u32) -> u64;
    fn enroute_count(&self) -> EnrouteTally;
}
