//! Firmware update receiver driven by the inbound BLE byte stream.
//!
//! Flow: `OTA_BEGIN` → N × raw image chunk → `OTA_END` → restart
//!
//! Control words are matched by exact length and content; every other
//! non-empty write is image data.  A write failure aborts the session so a
//! partial image can never become bootable; a commit failure keeps the
//! session open so the peer may retry `OTA_END`.

use core::fmt;

use log::{debug, info, warn};

use crate::app::ports::{InboundHandler, RestartPort, UpdateStorage};
use crate::error::StorageError;

pub const CMD_BEGIN: &[u8] = b"OTA_BEGIN";
pub const CMD_END: &[u8] = b"OTA_END";

// ── Inbound classification ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Begin,
    End,
    Data(&'a [u8]),
}

impl<'a> Inbound<'a> {
    pub fn classify(bytes: &'a [u8]) -> Self {
        if bytes == CMD_BEGIN {
            Self::Begin
        } else if bytes == CMD_END {
            Self::End
        } else {
            Self::Data(bytes)
        }
    }
}

// ── Error / event types ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// Storage refused to open a session; receiver stays idle.
    BeginFailed(StorageError),
    /// A chunk could not be written; session aborted.
    WriteFailed(StorageError),
    /// Verify/activate failed; session still open for retry.
    CommitFailed(StorageError),
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginFailed(e) => write!(f, "begin failed: {e}"),
            Self::WriteFailed(e) => write!(f, "write failed, session aborted: {e}"),
            Self::CommitFailed(e) => write!(f, "commit failed, retry allowed: {e}"),
        }
    }
}

/// Why a chunk had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    /// `OTA_BEGIN` while a session is already open.
    NestedBegin,
    /// `OTA_END` with no open session.
    EndWithoutSession,
    /// Plain data while idle.
    DataWhileIdle,
    /// A committed image is waiting for the restart.
    RestartPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaEvent {
    Started,
    ChunkWritten { len: usize, total: u64 },
    /// Image activated; the device must restart.
    Committed { total: u64 },
    Ignored(IgnoreReason),
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    InProgress,
}

/// The single update session owned by an [`OtaReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaSession {
    pub state: OtaState,
    pub total_written: u64,
}

impl OtaSession {
    const IDLE: Self = Self { state: OtaState::Idle, total_written: 0 };
}

pub struct OtaReceiver<S: UpdateStorage> {
    storage: S,
    session: OtaSession,
    restart_pending: bool,
}

impl<S: UpdateStorage> OtaReceiver<S> {
    pub fn new(storage: S) -> Self {
        Self { storage, session: OtaSession::IDLE, restart_pending: false }
    }

    pub fn session(&self) -> OtaSession {
        self.session
    }

    pub fn state(&self) -> OtaState {
        self.session.state
    }

    pub fn total_written(&self) -> u64 {
        self.session.total_written
    }

    pub fn is_restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Process one inbound write.
    pub fn handle(&mut self, bytes: &[u8]) -> Result<OtaEvent, OtaError> {
        if bytes.is_empty() {
            return Ok(OtaEvent::Ignored(IgnoreReason::Empty));
        }
        if self.restart_pending {
            debug!("OTA: {} bytes ignored, restart pending", bytes.len());
            return Ok(OtaEvent::Ignored(IgnoreReason::RestartPending));
        }

        match (self.session.state, Inbound::classify(bytes)) {
            (OtaState::Idle, Inbound::Begin) => {
                self.storage.begin_update().map_err(|e| {
                    warn!("OTA: begin_update failed: {}", e);
                    OtaError::BeginFailed(e)
                })?;
                self.session = OtaSession { state: OtaState::InProgress, total_written: 0 };
                info!("OTA: session started");
                Ok(OtaEvent::Started)
            }
            (OtaState::InProgress, Inbound::Begin) => {
                warn!("OTA: OTA_BEGIN while in progress, ignored");
                Ok(OtaEvent::Ignored(IgnoreReason::NestedBegin))
            }
            (OtaState::Idle, Inbound::End) => {
                warn!("OTA: OTA_END without session, ignored");
                Ok(OtaEvent::Ignored(IgnoreReason::EndWithoutSession))
            }
            (OtaState::Idle, Inbound::Data(data)) => {
                debug!("OTA: {} data bytes while idle, ignored", data.len());
                Ok(OtaEvent::Ignored(IgnoreReason::DataWhileIdle))
            }
            (OtaState::InProgress, Inbound::Data(data)) => {
                if let Err(e) = self.storage.write(data) {
                    warn!(
                        "OTA: write failed after {} bytes: {}",
                        self.session.total_written, e
                    );
                    self.abort();
                    return Err(OtaError::WriteFailed(e));
                }
                self.session.total_written += data.len() as u64;
                debug!("OTA: +{} bytes (total {})", data.len(), self.session.total_written);
                Ok(OtaEvent::ChunkWritten { len: data.len(), total: self.session.total_written })
            }
            (OtaState::InProgress, Inbound::End) => {
                let total = self.session.total_written;
                self.storage.commit_and_activate().map_err(|e| {
                    warn!("OTA: commit of {} bytes failed: {}", total, e);
                    OtaError::CommitFailed(e)
                })?;
                info!("OTA: image committed ({} bytes), restart pending", total);
                self.session = OtaSession::IDLE;
                self.restart_pending = true;
                Ok(OtaEvent::Committed { total })
            }
        }
    }

    /// Drop any open session and discard the partial image.
    pub fn abort(&mut self) {
        if self.session.state == OtaState::InProgress {
            self.storage.abort_update();
            warn!("OTA: session aborted after {} bytes", self.session.total_written);
        }
        self.session = OtaSession::IDLE;
    }
}

// ── Transport glue ────────────────────────────────────────────

/// Inbound handler that feeds the receiver and schedules the restart after
/// a commit.
pub struct OtaLinkHandler<S: UpdateStorage, R: RestartPort> {
    receiver: OtaReceiver<S>,
    restart: R,
    restart_delay_ms: u32,
}

impl<S: UpdateStorage, R: RestartPort> OtaLinkHandler<S, R> {
    pub fn new(receiver: OtaReceiver<S>, restart: R, restart_delay_ms: u32) -> Self {
        Self { receiver, restart, restart_delay_ms }
    }

    pub fn receiver(&self) -> &OtaReceiver<S> {
        &self.receiver
    }

    pub fn restart_port(&self) -> &R {
        &self.restart
    }
}

impl<S, R> InboundHandler for OtaLinkHandler<S, R>
where
    S: UpdateStorage + Send,
    R: RestartPort,
{
    fn on_receive(&mut self, bytes: &[u8]) {
        match self.receiver.handle(bytes) {
            Ok(OtaEvent::Committed { .. }) => {
                info!("OTA: restarting in {} ms", self.restart_delay_ms);
                self.restart.schedule_restart(self.restart_delay_ms);
            }
            Ok(_) => {}
            Err(e) => warn!("OTA: {}", e),
        }
    }

    fn on_peer_disconnected(&mut self) {
        self.receiver.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────
