// SPDX-License-Identifier: MPL-2.0

use std::collections::HashSet;

use super::error::MqttClientError;

/// Hands out non-zero packet identifiers that are unique among the
/// requests still waiting for their final acknowledgment.
#[derive(Debug)]
pub struct PacketIdAllocator {
    in_use: HashSet<u16>,
    next_id: u16,
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self {
            in_use: HashSet::new(),
            next_id: 1,
        }
    }
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Result<u16, MqttClientError> {
        if self.in_use.len() >= u16::MAX as usize {
            return Err(MqttClientError::PidOverrun);
        }
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id == 0 {
                self.next_id = 1;
            }
            if self.in_use.insert(id) {
                return Ok(id);
            }
        }
    }

    /// Returns false if the identifier was not allocated.
    pub fn release(&mut self, packet_id: u16) -> bool {
        self.in_use.remove(&packet_id)
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}
