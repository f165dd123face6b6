use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::protocol::Channel;

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub message_id: u32,
    pub payload: Bytes,
    pub channel: Channel,
    /// Every datagram sequence this message was sent under.
    pub sequences: Vec<u32>,
    pub last_sent: Instant,
    pub attempts: u32,
}

/// Reliable-unordered messages awaiting acknowledgement.
#[derive(Debug)]
pub struct ReliableQueue {
    pending: VecDeque<PendingMessage>,
    next_message_id: u32,
    max_pending: usize,
}

impl ReliableQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            next_message_id: 0,
            max_pending,
        }
    }

    pub fn next_message_id(&mut self) -> u32 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        id
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.max_pending
    }

    pub fn push(
        &mut self,
        message_id: u32,
        payload: Bytes,
        channel: Channel,
        sequence: u32,
        now: Instant,
    ) {
        self.pending.push_back(PendingMessage {
            message_id,
            payload,
            channel,
            sequences: vec![sequence],
            last_sent: now,
            attempts: 1,
        });
    }

    /// Drops every message that was carried by one of `acked` sequences.
    pub fn acknowledge(&mut self, acked: &[u32]) -> usize {
        if acked.is_empty() {
            return 0;
        }

        let before = self.pending.len();
        self.pending
            .retain(|m| !m.sequences.iter().any(|s| acked.contains(s)));
        before - self.pending.len()
    }

    /// Removes messages that already used up `max_attempts` sends and have
    /// waited out `resend_after` since the last one.
    pub fn expire(&mut self, now: Instant, resend_after: Duration, max_attempts: u32) -> Vec<u32> {
        let mut expired = Vec::new();
        self.pending.retain(|m| {
            let keep = m.attempts < max_attempts
                || now.saturating_duration_since(m.last_sent) < resend_after;
            if !keep {
                expired.push(m.message_id);
            }
            keep
        });
        expired
    }

    pub fn due(&self, now: Instant, resend_after: Duration) -> Vec<(u32, Bytes, Channel)> {
        self.pending
            .iter()
            .filter(|m| now.saturating_duration_since(m.last_sent) >= resend_after)
            .map(|m| (m.message_id, m.payload.clone(), m.channel))
            .collect()
    }

    pub fn mark_sent(&mut self, message_id: u32, sequence: u32, now: Instant) {
        if let Some(message) = self.pending.iter_mut().find(|m| m.message_id == message_id) {
            message.sequences.push(sequence);
            message.last_sent = now;
            message.attempts += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
