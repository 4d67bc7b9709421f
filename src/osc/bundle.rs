//! Size-bounded bundle packing.
//!
//! Messages accumulate on a stack. When the next message would push the
//! estimated bundle size past the budget, the stack is flushed into a bundle.
//! Flushed messages and the finished bundle list both come out
//! last-added-first; clients see that order on the wire.

use std::sync::Mutex;
use std::time::SystemTime;

use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};

use crate::error::Result;

/// Byte budget for one bundle
pub const MAX_BUNDLE_SIZE: usize = 2048;
/// Per-message cost charged for messages already accumulated
pub const MESSAGE_SIZE_ESTIMATE: usize = 64;

/// Bytes charged per character of addresses and string arguments
const CHAR_SIZE: usize = 2;
/// Comma and type tag
const TYPE_TAG_SIZE: usize = 2;

/// Estimated size of one message: address + type tag + arguments
pub fn message_size(msg: &OscMessage) -> usize {
    msg.addr.chars().count() * CHAR_SIZE + TYPE_TAG_SIZE + msg.args.iter().map(arg_size).sum::<usize>()
}

fn arg_size(arg: &OscType) -> usize {
    match arg {
        OscType::Int(_) | OscType::Float(_) => 4,
        OscType::Long(_) | OscType::Double(_) | OscType::Time(_) => 8,
        OscType::String(s) => s.chars().count() * CHAR_SIZE,
        OscType::Blob(b) => b.len(),
        OscType::Array(a) => a.content.iter().map(arg_size).sum(),
        OscType::Nil | OscType::Inf => 0,
        _ => 4,
    }
}

fn now_timetag() -> OscTime {
    // (0, 1) is the OSC "immediately" tag
    OscTime::try_from(SystemTime::now()).unwrap_or(OscTime {
        seconds: 0,
        fractional: 1,
    })
}

#[derive(Default)]
struct Pending {
    messages: Vec<OscMessage>,
    bundles: Vec<OscBundle>,
}

impl Pending {
    fn flush(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        let content = self.messages.drain(..).rev().map(OscPacket::Message).collect();
        self.bundles.push(OscBundle {
            timetag: now_timetag(),
            content,
        });
    }
}

/// Per-frame message accumulator. `add_message` may be called from several threads.
pub struct BundleBuilder {
    max_bundle_size: usize,
    message_size_estimate: usize,
    pending: Mutex<Pending>,
}

impl BundleBuilder {
    pub fn new(max_bundle_size: usize, message_size_estimate: usize) -> Self {
        Self {
            max_bundle_size,
            message_size_estimate,
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn add_message(&self, msg: OscMessage) {
        let size = message_size(&msg);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let projected = pending.messages.len() * self.message_size_estimate + size;
        if projected > self.max_bundle_size {
            pending.flush();
        }
        pending.messages.push(msg);
    }

    /// Flush the remainder and hand back every bundle, newest first. Leaves the builder empty.
    pub fn build_bundles(&self) -> Vec<OscBundle> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.flush();
        let mut bundles = std::mem::take(&mut pending.bundles);
        bundles.reverse();
        bundles
    }

    /// Messages not yet flushed, newest first
    pub fn pending_messages(&self) -> Vec<OscMessage> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.messages.iter().rev().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.messages.is_empty() && pending.bundles.is_empty()
    }
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::new(MAX_BUNDLE_SIZE, MESSAGE_SIZE_ESTIMATE)
    }
}

/// Encode a bundle to OSC bytes
pub fn encode_bundle(bundle: &OscBundle) -> Result<Vec<u8>> {
    let packet = OscPacket::Bundle(bundle.clone());
    Ok(encoder::encode(&packet)?)
}

/// Message addresses of a bundle in wire order
pub fn bundle_addresses(bundle: &OscBundle) -> Vec<&str> {
    bundle
        .content
        .iter()
        .filter_map(|p| match p {
            OscPacket::Message(m) => Some(m.addr.as_str()),
            OscPacket::Bundle(_) => None,
        })
        .collect()
}
