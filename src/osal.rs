//! Operating System Abstraction Layer (OSAL) for the capture channel
//!
//! This module provides platform-agnostic abstractions for the few
//! system-dependent operations the channel needs: time keeping, sleeping in
//! process context, local interrupt masking and interrupt line registration.

/// DMA address type
pub type DmaAddr = u64;

/// Time type for timestamps
pub type TimeStamp = u64;

/// Saved local interrupt state returned by [`IrqControl::irq_save`].
pub type IrqFlags = usize;

/// Error types for OSAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsalError {
    /// The platform refused the request.
    DeviceError,
}

/// Local interrupt masking.
///
/// Implementations must allow nesting: `irq_restore` puts back exactly the
/// state captured by the matching `irq_save`.
pub trait IrqControl {
    /// Disable interrupt delivery on the current CPU and return the prior state.
    fn irq_save(&self) -> IrqFlags;

    /// Restore the interrupt state captured by `irq_save`.
    fn irq_restore(&self, flags: IrqFlags);
}

/// OSAL trait for platform-specific implementations
pub trait Osal: IrqControl {
    /// Get current timestamp in microseconds
    fn get_time_us(&self) -> TimeStamp;

    /// Sleep for specified milliseconds
    fn msleep(&self, ms: u32);

    /// Check if timeout occurred
    fn timeout_check(&self, start_time: TimeStamp, timeout_us: u32) -> bool {
        let elapsed = self.get_time_us().saturating_sub(start_time);
        elapsed >= timeout_us as u64
    }

    /// Attach the channel interrupt handler to `irq`.
    fn request_irq(&self, irq: u32) -> Result<(), OsalError>;

    /// Detach the channel interrupt handler from `irq`.
    fn free_irq(&self, irq: u32);

    /// Ask the platform to run [`crate::Camif::run_deferred`] for `instance`
    /// soon, outside of hard interrupt context.
    fn kick_deferred(&self, _instance: u32) {}
}
