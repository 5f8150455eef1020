// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Parameter get/set registry and blocking client (spec.md §4.6).
//
// Server side follows `service_registry` (a map from an id to a registered
// handler, invoked from a dispatch loop); client side follows a single-slot
// blocking request pattern (one mutex plus one completion signal, reject a
// second caller rather than corrupt shared state).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::block::Block;
use crate::channel::ChannelId;
use crate::config::PARAM_DEFAULT_TIMEOUT;
use crate::engine::RdtEngine;
use crate::error::{return_code, ServiceError};
use crate::sync::CompletionSignal;

pub const MAX_PARAM_LENGTH: usize = 8 * 1024;

const OP_GET: u8 = 0;
const OP_SET: u8 = 1;
const OP_RESP: u8 = 2;

/// A registered parameter: an optional read-back and an optional write
/// handler. Absent means "not supported in that direction" (spec.md §4.6).
pub struct ParamDescriptor {
    pub read: Option<Box<dyn Fn() -> Vec<u8> + Send + Sync>>,
    pub write: Option<Box<dyn Fn(&[u8]) -> bool + Send + Sync>>,
}

struct WireFrame {
    message_type: u8,
    op: u8,
    return_code: u8,
    data: Vec<u8>,
}

impl WireFrame {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.data.len());
        out.push(self.message_type);
        out.push(self.op);
        out.push(self.return_code);
        out.extend_from_slice(&self.data);
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }
        Some(Self {
            message_type: bytes[0],
            op: bytes[1],
            return_code: bytes[2],
            data: bytes[3..].to_vec(),
        })
    }
}

struct PendingRequest {
    message_type: u8,
    response: Option<(u8, Vec<u8>)>,
}

/// Registry plus single-in-flight blocking client for the parameter service.
pub struct ParamService {
    engine: Arc<RdtEngine>,
    descriptors: Mutex<HashMap<u8, ParamDescriptor>>,
    in_flight: Mutex<Option<PendingRequest>>,
    completion: CompletionSignal,
}

impl ParamService {
    pub fn new(engine: Arc<RdtEngine>) -> Arc<Self> {
        let svc = Arc::new(Self {
            engine,
            descriptors: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(None),
            completion: CompletionSignal::new(),
        });
        svc.clone().spawn_reader();
        svc
    }

    fn spawn_reader(self: Arc<Self>) {
        std::thread::Builder::new()
            .name("rdt-param-reader".into())
            .spawn(move || loop {
                match self.engine.receive_block(ChannelId::Params, Duration::from_millis(250)) {
                    Some(block) => self.handle_inbound(block),
                    None => continue,
                }
            })
            .expect("failed to spawn parameter reader thread");
    }

    pub fn register(&self, message_type: u8, descriptor: ParamDescriptor) {
        self.descriptors.lock().unwrap_or_else(|e| e.into_inner()).insert(message_type, descriptor);
    }

    fn handle_inbound(&self, block: Block) {
        let Some(frame) = WireFrame::decode(block.as_slice()) else {
            return;
        };
        match frame.op {
            OP_GET | OP_SET => self.handle_request(frame),
            OP_RESP => self.handle_response(frame),
            _ => {}
        }
    }

    fn handle_request(&self, frame: WireFrame) {
        let descriptors = self.descriptors.lock().unwrap_or_else(|e| e.into_inner());
        let reply = match descriptors.get(&frame.message_type) {
            None => WireFrame {
                message_type: frame.message_type,
                op: OP_RESP,
                return_code: return_code::param::UNKNOWN,
                data: Vec::new(),
            },
            Some(desc) if frame.op == OP_GET => match &desc.read {
                Some(read) => WireFrame {
                    message_type: frame.message_type,
                    op: OP_RESP,
                    return_code: return_code::param::OK,
                    data: read(),
                },
                None => WireFrame {
                    message_type: frame.message_type,
                    op: OP_RESP,
                    return_code: return_code::param::NOT_SUPPORTED,
                    data: Vec::new(),
                },
            },
            Some(desc) => match &desc.write {
                Some(write) if write(&frame.data) => WireFrame {
                    message_type: frame.message_type,
                    op: OP_RESP,
                    return_code: return_code::param::OK,
                    data: Vec::new(),
                },
                Some(_) => WireFrame {
                    message_type: frame.message_type,
                    op: OP_RESP,
                    return_code: return_code::param::INTERNAL,
                    data: Vec::new(),
                },
                None => WireFrame {
                    message_type: frame.message_type,
                    op: OP_RESP,
                    return_code: return_code::param::WRITE_NOT_SUPPORTED,
                    data: Vec::new(),
                },
            },
        };
        drop(descriptors);
        let _ = self.engine.enqueue_block(ChannelId::Params, Block::new(reply.encode()));
    }

    fn handle_response(&self, frame: WireFrame) {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pending) = slot.as_mut() {
            if pending.message_type == frame.message_type {
                pending.response = Some((frame.return_code, frame.data));
                drop(slot);
                self.completion.signal();
            }
        }
    }

    /// Blocking GET (spec.md §4.6 "Client role"). `max_len` truncates the
    /// returned data the way the C API's `user_size_inout` truncates into a
    /// caller buffer.
    pub fn get(&self, message_type: u8, max_len: usize, timeout: Duration) -> Result<Vec<u8>, ServiceError> {
        self.request(message_type, OP_GET, &[], max_len, timeout)
    }

    /// Blocking SET (spec.md §4.6 "Client role").
    pub fn set(&self, message_type: u8, data: &[u8], timeout: Duration) -> Result<(), ServiceError> {
        self.request(message_type, OP_SET, data, 0, timeout).map(|_| ())
    }

    fn request(
        &self,
        message_type: u8,
        op: u8,
        data: &[u8],
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, ServiceError> {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(ServiceError::RequestInProgress);
        }
        *slot = Some(PendingRequest { message_type, response: None });
        drop(slot);
        self.completion.reset();

        let frame = WireFrame { message_type, op, return_code: return_code::OK, data: data.to_vec() };
        if self.engine.enqueue_block(ChannelId::Params, Block::new(frame.encode())).is_err() {
            *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
            return Err(ServiceError::SendFailure);
        }

        let signalled = self.completion.wait(timeout);
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let pending = slot.take();
        drop(slot);

        if !signalled {
            return Err(ServiceError::Timeout);
        }
        let (rc, mut data) = pending.and_then(|p| p.response).ok_or(ServiceError::Timeout)?;
        if rc != return_code::param::OK {
            return Err(ServiceError::Protocol(rc));
        }
        if max_len > 0 {
            data.truncate(max_len);
        }
        Ok(data)
    }
}

/// Default timeout for callers that don't need to override it (spec.md §6).
pub const DEFAULT_TIMEOUT: Duration = PARAM_DEFAULT_TIMEOUT;
