// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Error types for the service layer and the external ports.
//
// Transport-level failures (CRC mismatch, wrong peer, duplicate packet,
// queue-full drop, retry exhaustion) are never surfaced through these types —
// they are logged and folded into `LinkStats` per the engine's drop-and-record
// policy. Only the request/response services (pairing, parameters, files) and
// the external port traits return errors to a caller.

use thiserror::Error;

/// Reserved `return_code` values from the parameter/file wire protocols,
/// carried by [`ServiceError::Protocol`] so a caller can match on the exact
/// code a peer or the local server returned. The transport-layer codes
/// (`NOT_INITIALIZED`..`TIMEOUT`) are shared by both services; the
/// protocol-specific codes live in their own submodules since the two wire
/// formats assign different meanings to the same numeric value (spec.md
/// §4.6, §4.7).
pub mod return_code {
    pub const OK: u8 = 0x00;

    pub const NOT_INITIALIZED: u8 = 0xFF;
    pub const IN_PROGRESS: u8 = 0xFE;
    pub const SEND_FAILURE: u8 = 0xFD;
    pub const TIMEOUT: u8 = 0xFC;

    /// Parameter-service return codes (spec.md §4.6).
    pub mod param {
        pub const OK: u8 = 0x00;
        pub const UNKNOWN: u8 = 0x01;
        pub const NOT_SUPPORTED: u8 = 0x02;
        pub const WRITE_NOT_SUPPORTED: u8 = 0x03;
        /// Not in spec.md's table; assigned for a registered write handler
        /// that reports failure, by analogy with the file service's
        /// `INTERNAL` code.
        pub const INTERNAL: u8 = 0x05;
    }

    /// File-service return codes (spec.md §4.7).
    pub mod file {
        pub const OK: u8 = 0x00;
        pub const UNKNOWN: u8 = 0x01;
        pub const NOFILE: u8 = 0x02;
        pub const IO: u8 = 0x03;
        pub const TOOLARGE: u8 = 0x04;
        pub const INTERNAL: u8 = 0x05;
    }
}

/// Errors surfaced by the blocking parameter/file/pairing client APIs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// The service was used before `init`/`start` was called.
    #[error("service not initialized")]
    NotInitialized,
    /// Another request is already occupying the single in-flight slot.
    #[error("a request is already in progress")]
    RequestInProgress,
    /// No response arrived within the caller's timeout.
    #[error("request timed out")]
    Timeout,
    /// The outbound enqueue failed (e.g. the tx queue for the channel is full).
    #[error("failed to send request")]
    SendFailure,
    /// The peer (or local server) replied with a non-zero `return_code`.
    #[error("protocol error, return_code={0:#04x}")]
    Protocol(u8),
}

impl ServiceError {
    /// The wire `return_code` this error corresponds to, for server-side
    /// symmetry (a server builds the same codes it reports via this enum).
    pub fn return_code(self) -> u8 {
        match self {
            ServiceError::NotInitialized => return_code::NOT_INITIALIZED,
            ServiceError::RequestInProgress => return_code::IN_PROGRESS,
            ServiceError::Timeout => return_code::TIMEOUT,
            ServiceError::SendFailure => return_code::SEND_FAILURE,
            ServiceError::Protocol(rc) => rc,
        }
    }
}

/// Errors returned by the external port traits (`RadioPort`, `PersistencePort`,
/// `FileSystemPort`). The engine never lets these escape past its own
/// boundary — see `SPEC_FULL.md` §2.2 and §7.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("no such file: {0}")]
    NoSuchFile(String),
    #[error("peer table full")]
    PeerTableFull,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
