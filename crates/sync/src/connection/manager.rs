use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};

use super::ConnectError;
use super::slot::ConnectionSlot;
use super::state::ConnectionState;
use crate::config::NetConfig;
use crate::net::{FrameHeader, PacketType};

/// Fixed pool of server-side slots, indexed by client id.
#[derive(Debug)]
pub struct ConnectionManager {
    slots: Vec<ConnectionSlot>,
    by_addr: HashMap<SocketAddr, usize>,
    free: Vec<usize>,
    last_reconnect: Vec<Option<Duration>>,
    next_player_id: u16,
    clock: Duration,
    config: NetConfig,
}

impl ConnectionManager {
    pub fn new(config: &NetConfig) -> Self {
        let slots = (0..config.max_clients)
            .map(|index| ConnectionSlot::new(index as u32, ConnectionState::ServerEmpty, config))
            .collect();
        Self {
            slots,
            by_addr: HashMap::new(),
            // popped from the back, so lower ids are handed out first
            free: (0..config.max_clients).rev().collect(),
            last_reconnect: vec![None; config.max_clients],
            next_player_id: 1,
            clock: Duration::ZERO,
            config: config.clone(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn advance(&mut self, dt: Duration) {
        self.clock += dt;
    }

    pub fn get(&self, client_id: u32) -> Option<&ConnectionSlot> {
        self.slots.get(client_id as usize)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut ConnectionSlot> {
        self.slots.get_mut(client_id as usize)
    }

    pub fn find_by_addr(&self, addr: &SocketAddr) -> Option<u32> {
        self.by_addr.get(addr).map(|&index| index as u32)
    }

    /// Connected session carrying `salt`, if any.
    pub fn find_by_salt(&self, salt: u32) -> Option<u32> {
        self.slots
            .iter()
            .find(|slot| slot.state.is_connected() && slot.salt == salt)
            .map(|slot| slot.client_id)
    }

    /// Slots bound to an address, including ones whose first datagram has
    /// not been processed yet.
    pub fn active_ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|slot| slot.addr.is_some())
            .map(|slot| slot.client_id)
            .collect()
    }

    pub fn connected_ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|slot| slot.state.is_connected())
            .map(|slot| slot.client_id)
            .collect()
    }

    pub fn allocate(&mut self, addr: SocketAddr) -> Result<u32, ConnectError> {
        let Some(index) = self.free.pop() else {
            warn!("Rejecting {}: all {} slots in use", addr, self.slots.len());
            return Err(ConnectError::ServerFull);
        };
        let player_id = self.next_player_id;
        self.next_player_id = self.next_player_id.wrapping_add(1).max(1);

        let slot = &mut self.slots[index];
        slot.addr = Some(addr);
        slot.player_id = player_id;
        self.by_addr.insert(addr, index);
        self.last_reconnect[index] = None;

        debug!("Allocated slot {} for {}", index, addr);
        Ok(index as u32)
    }

    /// Moves a session to a new network address, keeping its salt and
    /// sequence history.
    pub fn rehome(&mut self, client_id: u32, addr: SocketAddr) -> Result<(), ConnectError> {
        let index = client_id as usize;
        if index >= self.slots.len() || !self.slots[index].state.is_connected() {
            return Err(ConnectError::UnknownSession);
        }
        if let Some(last) = self.last_reconnect[index] {
            if self.clock.saturating_sub(last) < self.config.reconnect_min_interval() {
                return Err(ConnectError::ReconnectTooSoon);
            }
        }
        self.last_reconnect[index] = Some(self.clock);

        let slot = &mut self.slots[index];
        if let Some(old) = slot.addr.replace(addr) {
            if old != addr {
                self.by_addr.remove(&old);
                info!("Client {} moved from {} to {}", client_id, old, addr);
            }
        }
        self.by_addr.insert(addr, index);
        Ok(())
    }

    pub fn release(&mut self, client_id: u32) {
        let index = client_id as usize;
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if let Some(addr) = slot.addr.take() {
            self.by_addr.remove(&addr);
        }
        slot.reset(&self.config);
        if !self.free.contains(&index) {
            self.free.push(index);
            // keep handing out the lowest id first
            self.free.sort_unstable_by(|a, b| b.cmp(a));
        }
    }

    /// Finds or creates the slot a datagram belongs to.
    ///
    /// Known addresses map to their slot. From an unknown address, a
    /// connection request allocates a slot and a reconnect with a live salt
    /// re-homes that session. Anything else is `Ok(None)`.
    pub fn route(
        &mut self,
        addr: SocketAddr,
        header: &FrameHeader,
    ) -> Result<Option<u32>, ConnectError> {
        if let Some(client_id) = self.find_by_addr(&addr) {
            // a wrong salt falls through to the slot, which drops it
            let own_session = self.slots[client_id as usize].salt == header.salt;
            if header.packet_type == PacketType::Reconnect && own_session {
                self.rehome(client_id, addr)?;
            }
            return Ok(Some(client_id));
        }

        match header.packet_type {
            PacketType::ConnectionRequest => self.allocate(addr).map(Some),
            PacketType::Reconnect => {
                let client_id = self
                    .find_by_salt(header.salt)
                    .ok_or(ConnectError::UnknownSession)?;
                self.rehome(client_id, addr)?;
                Ok(Some(client_id))
            }
            _ => Ok(None),
        }
    }
}
