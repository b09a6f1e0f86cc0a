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

//! Write-only statistics sinks.
//!
//! The workload and the network report through these boundaries and
//! never read back. File sinks degrade to a logged error on I/O failure
//! rather than aborting a long run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::Error;
use crate::message::Message;

pub trait MessageLog {
    fn start_transaction(&mut self, transaction: u64);
    fn log_message(&mut self, message: &Message);
    fn end_transaction(&mut self, transaction: u64);
}

pub trait TrafficLog {
    fn log(
        &mut self,
        device: &str,
        input_port: u32,
        input_vc: u32,
        output_port: u32,
        output_vc: u32,
        flits: u32,
    );
}

/// CSV message log writing one line per record.
pub struct CsvMessageLog {
    out: BufWriter<File>,
    is_error_state: bool,
}

impl CsvMessageLog {
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            is_error_state: false,
        })
    }

    fn write_line(&mut self, line: String) {
        let result: io::Result<()> = writeln!(self.out, "{}", line);
        if let Err(e) = result {
            if !self.is_error_state {
                self.is_error_state = true;
                log::error!("message log write failed: {:?}", e);
            }
        }
    }
}

impl MessageLog for CsvMessageLog {
    fn start_transaction(&mut self, transaction: u64) {
        self.write_line(format!("start,{:#x}", transaction));
    }

    fn log_message(&mut self, message: &Message) {
        self.write_line(format!(
            "message,{},{},{},{:#x},{}",
            message.id,
            message.source,
            message.destination,
            message.transaction,
            message.num_flits()
        ));
    }

    fn end_transaction(&mut self, transaction: u64) {
        self.write_line(format!("end,{:#x}", transaction));
    }
}

/// CSV traffic log writing one line per reported crossing.
pub struct CsvTrafficLog {
    out: BufWriter<File>,
    is_error_state: bool,
}

impl CsvTrafficLog {
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            is_error_state: false,
        })
    }
}

impl TrafficLog for CsvTrafficLog {
    fn log(
        &mut self,
        device: &str,
        input_port: u32,
        input_vc: u32,
        output_port: u32,
        output_vc: u32,
        flits: u32,
    ) {
        let result: io::Result<()> = writeln!(
            self.out,
            "{},{},{},{},{},{}",
            device, input_port, input_vc, output_port, output_vc, flits
        );
        if let Err(e) = result {
            if !self.is_error_state {
                self.is_error_state = true;
                log::error!("traffic log write failed: {:?}", e);
            }
        }
    }
}

/// Sink that discards everything.
#[derive(Default)]
pub struct NullMessageLog;

impl MessageLog for NullMessageLog {
    fn start_transaction(&mut self, _transaction: u64) {}
    fn log_message(&mut self, _message: &Message) {}
    fn end_transaction(&mut self, _transaction: u64) {}
}

#[derive(Default)]
pub struct NullTrafficLog;

impl TrafficLog for NullTrafficLog {
    fn log(&mut self, _: &str, _: u32, _: u32, _: u32, _: u32, _: u32) {}
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryMessageLog {
    pub started: Vec<u64>,
    pub ended: Vec<u64>,
    /// (message id, transaction, flits) per logged message.
    pub messages: Vec<(u64, u64, u32)>,
}

impl MessageLog for MemoryMessageLog {
    fn start_transaction(&mut self, transaction: u64) {
        self.started.push(transaction);
    }

    fn log_message(&mut self, message: &Message) {
        self.messages
            .push((message.id, message.transaction, message.num_flits()));
    }

    fn end_transaction(&mut self, transaction: u64) {
        self.ended.push(transaction);
    }
}
