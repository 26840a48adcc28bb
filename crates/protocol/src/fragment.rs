//! Fragmenter/Reassembler (§4.5).
//!
//! Splits an outbound payload into `Packet` fragments sharing `(id,
//! num_indices)`, and reassembles inbound fragments back into a payload,
//! tracking gaps and deciding when a NACK is due.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::ProtocolError;
use crate::packet::{Packet, PacketType, MAX_PAYLOAD_SIZE};

/// Minimum time between two NACKs for the same `(id, index)` gap.
pub const NACK_REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Recent-packet cache sizes for NACK replay, keyed by stream type.
pub const VIDEO_NACK_CACHE_IDS: usize = 25;
pub const VIDEO_NACK_CACHE_FRAGMENTS: usize = 500;
pub const AUDIO_NACK_CACHE_IDS: usize = 100;
pub const AUDIO_NACK_CACHE_FRAGMENTS: usize = 3;

/// Splits a payload into fragments sharing `id` and `num_indices`.
pub fn fragment(packet_type: PacketType, id: i32, payload: &[u8]) -> Vec<Packet> {
    let num_indices = Packet::num_fragments(payload.len());
    payload
        .chunks(MAX_PAYLOAD_SIZE)
        .enumerate()
        .map(|(i, chunk)| Packet {
            packet_type,
            id,
            index: i as i16,
            num_indices,
            is_nack: false,
            data: chunk.to_vec(),
        })
        .collect()
}

/// Sender-side cache of recently-sent fragments, replayed verbatim on NACK.
pub struct SendCache {
    capacity_ids: usize,
    capacity_fragments: usize,
    /// id -> fragments, insertion-ordered for LRU eviction.
    entries: HashMap<i32, Vec<Packet>>,
    order: Vec<i32>,
}

impl SendCache {
    pub fn video() -> Self {
        Self::new(VIDEO_NACK_CACHE_IDS, VIDEO_NACK_CACHE_FRAGMENTS)
    }

    pub fn audio() -> Self {
        Self::new(AUDIO_NACK_CACHE_IDS, AUDIO_NACK_CACHE_FRAGMENTS)
    }

    fn new(capacity_ids: usize, capacity_fragments: usize) -> Self {
        SendCache {
            capacity_ids,
            capacity_fragments,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert(&mut self, id: i32, fragments: Vec<Packet>) {
        let fragments = if fragments.len() > self.capacity_fragments {
            fragments[..self.capacity_fragments].to_vec()
        } else {
            fragments
        };
        if self.entries.insert(id, fragments).is_none() {
            self.order.push(id);
        }
        while self.order.len() > self.capacity_ids {
            let evict = self.order.remove(0);
            self.entries.remove(&evict);
        }
    }

    pub fn get(&self, id: i32, index: i16) -> Option<&Packet> {
        self.entries
            .get(&id)
            .and_then(|frags| frags.iter().find(|p| p.index == index))
    }
}

struct ReassemblyEntry {
    num_indices: i16,
    received: Vec<bool>,
    buffer: Vec<Vec<u8>>,
    first_seen: Instant,
    last_nack_sent: HashMap<i16, Instant>,
}

impl ReassemblyEntry {
    fn new(num_indices: i16, now: Instant) -> Self {
        ReassemblyEntry {
            num_indices,
            received: vec![false; num_indices.max(0) as usize],
            buffer: vec![Vec::new(); num_indices.max(0) as usize],
            first_seen: now,
            last_nack_sent: HashMap::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    fn assemble(&self) -> Vec<u8> {
        self.buffer.concat()
    }
}

/// Receiver-side reassembly state for one stream (video or audio), keyed by
/// packet id.
pub struct Reassembler {
    entries: HashMap<i32, ReassemblyEntry>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler {
            entries: HashMap::new(),
        }
    }

    /// Feed one received fragment. Returns the reassembled payload once all
    /// fragments for its id have arrived; idempotent on duplicate fragments.
    pub fn receive(&mut self, packet: &Packet, now: Instant) -> Result<Option<Vec<u8>>, ProtocolError> {
        let entry = self
            .entries
            .entry(packet.id)
            .or_insert_with(|| ReassemblyEntry::new(packet.num_indices, now));

        if entry.num_indices != packet.num_indices {
            return Err(ProtocolError::SizeMismatch {
                tag: packet.id as u8,
                expected: entry.num_indices as usize,
                got: packet.num_indices as usize,
            });
        }

        let idx = packet.index as usize;
        if idx >= entry.received.len() {
            return Err(ProtocolError::PacketTooShort {
                expected: entry.received.len(),
                got: idx + 1,
            });
        }

        if !entry.received[idx] {
            entry.received[idx] = true;
            entry.buffer[idx] = packet.data.clone();
        }

        if entry.is_complete() {
            let payload = entry.assemble();
            self.entries.remove(&packet.id);
            Ok(Some(payload))
        } else {
            Ok(None)
        }
    }

    /// Missing fragment indices for `id` that are due a NACK (never NACKed,
    /// or last NACKed more than [`NACK_REFRESH_INTERVAL`] ago).
    pub fn gaps_due_for_nack(&mut self, id: i32, now: Instant) -> Vec<i16> {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Vec::new();
        };
        let mut due = Vec::new();
        for (idx, &received) in entry.received.iter().enumerate() {
            if received {
                continue;
            }
            let idx = idx as i16;
            let ready = match entry.last_nack_sent.get(&idx) {
                Some(last) => now.duration_since(*last) >= NACK_REFRESH_INTERVAL,
                None => true,
            };
            if ready {
                entry.last_nack_sent.insert(idx, now);
                due.push(idx);
            }
        }
        due
    }

    pub fn age(&self, id: i32, now: Instant) -> Option<Duration> {
        self.entries.get(&id).map(|e| now.duration_since(e.first_seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_then_reassemble_single_chunk() {
        let payload = vec![1u8, 2, 3, 4, 5];
        let frags = fragment(PacketType::Video, 1, &payload);
        assert_eq!(frags.len(), 1);

        let mut reasm = Reassembler::new();
        let now = Instant::now();
        let out = reasm.receive(&frags[0], now).unwrap();
        assert_eq!(out, Some(payload));
    }

    #[test]
    fn fragment_then_reassemble_multi_chunk_out_of_order() {
        let payload: Vec<u8> = (0..(MAX_PAYLOAD_SIZE * 3 + 10)).map(|i| (i % 256) as u8).collect();
        let mut frags = fragment(PacketType::Video, 2, &payload);
        assert_eq!(frags.len(), 4);
        frags.reverse();

        let mut reasm = Reassembler::new();
        let now = Instant::now();
        let mut result = None;
        for f in &frags {
            result = reasm.receive(f, now).unwrap();
        }
        assert_eq!(result, Some(payload));
    }

    #[test]
    fn duplicate_fragment_is_idempotent() {
        let payload = vec![9u8; 10];
        let frags = fragment(PacketType::Audio, 3, &payload);
        let mut reasm = Reassembler::new();
        let now = Instant::now();
        assert_eq!(reasm.receive(&frags[0], now).unwrap(), Some(payload.clone()));

        // Replaying after completion starts a fresh entry (id was removed);
        // feeding it again alone should not panic and should not crash.
        let frags2 = fragment(PacketType::Audio, 3, &payload);
        assert_eq!(reasm.receive(&frags2[0], now).unwrap(), Some(payload));
    }

    #[test]
    fn gap_detection_and_nack_refresh_interval() {
        let payload: Vec<u8> = vec![0u8; MAX_PAYLOAD_SIZE * 2];
        let frags = fragment(PacketType::Video, 4, &payload);
        let mut reasm = Reassembler::new();
        let t0 = Instant::now();
        reasm.receive(&frags[0], t0).unwrap();

        let due = reasm.gaps_due_for_nack(4, t0);
        assert_eq!(due, vec![1]);

        // Immediately again: should not be due yet.
        let due_again = reasm.gaps_due_for_nack(4, t0 + Duration::from_millis(10));
        assert!(due_again.is_empty());

        // After the refresh interval: due again.
        let due_later = reasm.gaps_due_for_nack(4, t0 + NACK_REFRESH_INTERVAL + Duration::from_millis(1));
        assert_eq!(due_later, vec![1]);
    }

    #[test]
    fn send_cache_replays_fragments_and_evicts_lru() {
        let mut cache = SendCache::new(2, 10);
        let payload = vec![1u8, 2, 3];
        cache.insert(1, fragment(PacketType::Video, 1, &payload));
        cache.insert(2, fragment(PacketType::Video, 2, &payload));
        cache.insert(3, fragment(PacketType::Video, 3, &payload));

        assert!(cache.get(1, 0).is_none(), "oldest id should be evicted");
        assert!(cache.get(2, 0).is_some());
        assert!(cache.get(3, 0).is_some());
    }

    #[test]
    fn size_mismatch_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE * 2];
        let frags = fragment(PacketType::Video, 7, &payload);
        let mut reasm = Reassembler::new();
        let now = Instant::now();
        reasm.receive(&frags[0], now).unwrap();

        let mut conflicting = frags[1].clone();
        conflicting.num_indices = 99;
        let err = reasm.receive(&conflicting, now);
        assert!(matches!(err, Err(ProtocolError::SizeMismatch { .. })));
    }
}
