/// Errors reported by the capture channel.
///
/// Only [`CamifError::ProcessQueueEmpty`] and [`CamifError::Fatal`] are
/// unrecoverable; see [`CamifError::is_fatal`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CamifError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("channel is not opened")]
    NotOpened,
    #[error("channel is already opened")]
    AlreadyOpened,
    #[error("channel is already started")]
    AlreadyStarted,
    #[error("channel is already stopped")]
    AlreadyStopped,
    #[error("channel is busy")]
    Busy,
    #[error("timed out waiting for last capture")]
    Timeout,
    #[error("failed to request irq {0}")]
    IrqRequest(u32),
    #[error("frame {index} is not tracked by this frame manager")]
    UntrackedFrame { index: usize },
    #[error("frame {index} is in an unexpected state")]
    InvalidFrameState { index: usize },
    #[error("no frame in process while hardware reported frame end (fcount {fcount})")]
    ProcessQueueEmpty { fcount: u32 },
    #[error("sensor fcount mailbox is unavailable")]
    MailboxUnavailable,
    #[error("channel halted after an internal consistency failure")]
    Fatal,
    #[error("operation not supported by this hardware")]
    Unsupported,
}

impl CamifError {
    /// Whether this error means a buffer lost its single owner.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProcessQueueEmpty { .. } | Self::Fatal)
    }
}
