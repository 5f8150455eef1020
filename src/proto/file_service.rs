// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// File service on the FILES channel: list / random-access read / offset-or-
// append write (spec.md §4.7).
//
// Same single-in-flight client shape as the parameter service; the server
// side follows a typed request dispatch (`typed_route`): decode a fixed
// header, switch on an opcode, reply with the matching response opcode.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use crate::block::Block;
use crate::channel::ChannelId;
use crate::engine::RdtEngine;
use crate::error::{return_code, ServiceError};
use crate::fs_port::{FileSystemPort, NO_SEEK};
use crate::sync::CompletionSignal;

pub const MAX_PATH_LEN: usize = 128;
pub const MAX_DATA_LEN: usize = 4 * 1024;
const HEADER_LEN: usize = 16;

const LIST: u8 = 1;
const LIST_RESP: u8 = 2;
const READ: u8 = 3;
const READ_RESP: u8 = 4;
const WRITE: u8 = 5;
const WRITE_RESP: u8 = 6;

struct FileFrame {
    command: u8,
    return_code: u8,
    request_id: u16,
    offset: u32,
    path: String,
    data: Vec<u8>,
}

impl FileFrame {
    fn encode(&self) -> Vec<u8> {
        let path_bytes = self.path.as_bytes();
        let mut out = Vec::with_capacity(HEADER_LEN + path_bytes.len() + self.data.len());
        out.push(self.command);
        out.push(self.return_code);
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.push(path_bytes.len() as u8);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(path_bytes);
        out.extend_from_slice(&self.data);
        out
    }

    /// Returns `None` (INTERNAL in the caller's eyes) if the declared
    /// `path_length`/`data_length` don't fit inside `bytes` (spec.md §4.7
    /// "Packet validity").
    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let command = bytes[0];
        let return_code = bytes[1];
        let request_id = u16::from_le_bytes(bytes[2..4].try_into().ok()?);
        let offset = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
        let data_length = u32::from_le_bytes(bytes[8..12].try_into().ok()?) as usize;
        let path_length = bytes[12] as usize;
        let path_start = HEADER_LEN;
        let path_end = path_start.checked_add(path_length)?;
        let data_end = path_end.checked_add(data_length)?;
        if data_end > bytes.len() {
            return None;
        }
        let path = String::from_utf8_lossy(&bytes[path_start..path_end]).into_owned();
        let data = bytes[path_end..data_end].to_vec();
        Some(Self { command, return_code, request_id, offset, path, data })
    }
}

struct PendingRequest {
    request_id: u16,
    response: Option<FileFrame>,
}

/// Client-side single in-flight slot plus server-side opcode handlers for
/// the file service.
pub struct FileService {
    engine: Arc<RdtEngine>,
    fs: Option<Arc<dyn FileSystemPort>>,
    next_request_id: AtomicU16,
    in_flight: Mutex<Option<PendingRequest>>,
    completion: CompletionSignal,
}

impl FileService {
    /// `fs` is `None` for a client-only instance (no server role).
    pub fn new(engine: Arc<RdtEngine>, fs: Option<Arc<dyn FileSystemPort>>) -> Arc<Self> {
        let svc = Arc::new(Self {
            engine,
            fs,
            next_request_id: AtomicU16::new(1),
            in_flight: Mutex::new(None),
            completion: CompletionSignal::new(),
        });
        svc.clone().spawn_reader();
        svc
    }

    fn spawn_reader(self: Arc<Self>) {
        std::thread::Builder::new()
            .name("rdt-file-reader".into())
            .spawn(move || loop {
                if let Some(block) = self.engine.receive_block(ChannelId::Files, Duration::from_millis(250)) {
                    self.handle_inbound(block);
                }
            })
            .expect("failed to spawn file-service reader thread");
    }

    fn next_request_id(&self) -> u16 {
        // Skip zero (spec.md §4.7 "fresh `request_id` from a monotonic
        // counter that skips zero").
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn handle_inbound(&self, block: Block) {
        let Some(frame) = FileFrame::decode(block.as_slice()) else {
            return;
        };
        match frame.command {
            LIST_RESP | READ_RESP | WRITE_RESP => self.handle_response(frame),
            LIST | READ | WRITE => self.handle_request(frame),
            _ => {}
        }
    }

    fn handle_response(&self, frame: FileFrame) {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pending) = slot.as_mut() {
            if pending.request_id == frame.request_id {
                pending.response = Some(frame);
                drop(slot);
                self.completion.signal();
            }
            // Mismatched request_id: dropped per spec.md §4.7.
        }
    }

    fn handle_request(&self, frame: FileFrame) {
        let Some(fs) = &self.fs else { return };
        let reply = match frame.command {
            LIST => self.handle_list(fs, &frame),
            READ => self.handle_read(fs, &frame),
            WRITE => self.handle_write(fs, &frame),
            _ => unreachable!(),
        };
        let _ = self.engine.enqueue_block(ChannelId::Files, Block::new(reply.encode()));
    }

    fn handle_list(&self, fs: &Arc<dyn FileSystemPort>, frame: &FileFrame) -> FileFrame {
        match fs.list_dir(&frame.path) {
            Ok(data) => FileFrame {
                command: LIST_RESP,
                return_code: return_code::file::OK,
                request_id: frame.request_id,
                offset: 0,
                path: String::new(),
                data,
            },
            Err(_) => self.error_reply(LIST_RESP, frame.request_id, return_code::file::IO),
        }
    }

    fn handle_read(&self, fs: &Arc<dyn FileSystemPort>, frame: &FileFrame) -> FileFrame {
        let max_len = frame.data.len().min(MAX_DATA_LEN);
        let offset = if frame.offset == NO_SEEK { None } else { Some(frame.offset) };
        match fs.read(&frame.path, offset, max_len) {
            Ok(data) => FileFrame {
                command: READ_RESP,
                return_code: return_code::file::OK,
                request_id: frame.request_id,
                offset: frame.offset,
                path: String::new(),
                data,
            },
            Err(crate::error::PortError::NoSuchFile(_)) => {
                self.error_reply(READ_RESP, frame.request_id, return_code::file::NOFILE)
            }
            Err(_) => self.error_reply(READ_RESP, frame.request_id, return_code::file::IO),
        }
    }

    fn handle_write(&self, fs: &Arc<dyn FileSystemPort>, frame: &FileFrame) -> FileFrame {
        let offset = if frame.offset == NO_SEEK { None } else { Some(frame.offset) };
        match fs.write(&frame.path, offset, &frame.data) {
            Ok(()) => FileFrame {
                command: WRITE_RESP,
                return_code: return_code::file::OK,
                request_id: frame.request_id,
                offset: frame.offset,
                path: String::new(),
                data: Vec::new(),
            },
            Err(_) => self.error_reply(WRITE_RESP, frame.request_id, return_code::file::IO),
        }
    }

    fn error_reply(&self, command: u8, request_id: u16, rc: u8) -> FileFrame {
        FileFrame { command, return_code: rc, request_id, offset: 0, path: String::new(), data: Vec::new() }
    }

    fn client_request(&self, command: u8, path: &str, offset: u32, data: Vec<u8>, timeout: Duration) -> Result<FileFrame, ServiceError> {
        if path.len() > MAX_PATH_LEN || data.len() > MAX_DATA_LEN {
            return Err(ServiceError::Protocol(return_code::file::TOOLARGE));
        }
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(ServiceError::RequestInProgress);
        }
        let request_id = self.next_request_id();
        *slot = Some(PendingRequest { request_id, response: None });
        drop(slot);
        self.completion.reset();

        // Normalize the directory path for LIST to end with a separator
        // instead of writing into the caller's buffer, as the original
        // in-place mutation did (spec.md §9 open question).
        let path = if command == LIST && !path.ends_with('/') {
            format!("{path}/")
        } else {
            path.to_string()
        };

        let frame = FileFrame { command, return_code: return_code::OK, request_id, offset, path, data };
        if self.engine.enqueue_block(ChannelId::Files, Block::new(frame.encode())).is_err() {
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
        let response = pending.and_then(|p| p.response).ok_or(ServiceError::Timeout)?;
        if response.return_code != return_code::file::OK {
            return Err(ServiceError::Protocol(response.return_code));
        }
        Ok(response)
    }

    pub fn list(&self, dir: &str, timeout: Duration) -> Result<Vec<u8>, ServiceError> {
        self.client_request(LIST, dir, 0, Vec::new(), timeout).map(|f| f.data)
    }

    /// `offset == None` reads from the current position (spec.md §4.7
    /// "no seek").
    pub fn read(&self, path: &str, offset: Option<u32>, len: usize, timeout: Duration) -> Result<Vec<u8>, ServiceError> {
        let offset_wire = offset.unwrap_or(NO_SEEK);
        let placeholder = vec![0u8; len.min(MAX_DATA_LEN)];
        self.client_request(READ, path, offset_wire, placeholder, timeout).map(|f| f.data)
    }

    /// `offset == None` appends (spec.md §4.7 "Offsets").
    pub fn write(&self, path: &str, offset: Option<u32>, data: &[u8], timeout: Duration) -> Result<(), ServiceError> {
        let offset_wire = offset.unwrap_or(NO_SEEK);
        self.client_request(WRITE, path, offset_wire, data.to_vec(), timeout).map(|_| ())
    }
}
