//! Interfaces of the collaborators the channel reports to.

use crate::framemgr::{FrameInfo, FrameStatus};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CamifEvent {
    FrameStart {
        fcount: u32,
    },
    /// `frame` is `None` when nothing completed this cycle.
    FrameEnd {
        fcount: u32,
        frame: Option<FrameInfo>,
        corrupted: bool,
    },
    VcFrameEnd {
        vc: usize,
        index: usize,
        fcount: u32,
    },
    /// CSI errors persisted long enough that capture was disabled.
    ErrorThreshold {
        error_count: u32,
    },
}

/// Subscriber of the next pipeline stage.
pub trait NotifySink: Send + Sync {
    fn notify(&self, instance: u32, event: CamifEvent);
}

/// Owner of the buffers, told when a buffer is handed back outside of the
/// normal dequeue path.
pub trait BufferDone: Send + Sync {
    fn complete(&self, index: usize, status: FrameStatus);
}

/// Group scheduler fed by an OTF channel.
pub trait GroupTrigger: Send + Sync {
    /// Whether a shot is currently waiting for the next frame.
    fn has_waiter(&self) -> bool;

    /// Frames the sensor runs ahead of the group.
    fn skip_shots(&self) -> u32 {
        0
    }

    /// Record the fcount the group should pick up next.
    fn set_sensor_fcount(&self, fcount: u32);

    /// Release the waiting shot.
    fn trigger(&self);
}
