//! Trait abstraction for USB transport operations to enable testing

use super::DeviceInfo;
use crate::error::Result;

/// An opened adapter that yields raw reports.
#[cfg_attr(test, mockall::automock)]
pub trait ReportSource {
    /// Size of one report in bytes.
    fn max_packet_size(&self) -> usize;

    /// Reads one report into `buf`, returning the number of bytes received.
    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Releases the claimed interface. A second call is a no-op.
    fn release(&mut self) -> Result<()>;
}

/// Enumerates and opens adapters.
pub trait UsbBus {
    type Handle: ReportSource;

    /// Lists attached adapters. Never fails; an unreadable bus yields no devices.
    fn enumerate(&self) -> Vec<DeviceInfo>;

    /// Opens, configures and claims one adapter.
    fn open(&self, device: &DeviceInfo) -> Result<Self::Handle>;
}
