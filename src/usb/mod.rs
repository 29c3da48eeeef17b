//! # USB Transport Module
//!
//! Handles the Phoenix RC USB adapter through libusb (`rusb`).
//!
//! This module handles:
//! - Enumerating adapters by vendor/product id
//! - Detaching the kernel HID driver from interface 0
//! - Selecting configuration 1 and claiming interface 0
//! - Bulk-reading raw reports from endpoint 1
//! - Releasing the interface and re-attaching the kernel driver
//!
//! ## Adapter Identification
//!
//! - Vendor ID: 0x1781
//! - Product ID: 0x0898

pub mod transport_trait;

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, info, warn};

use crate::error::{PhoenixError, Result};
use transport_trait::{ReportSource, UsbBus};

/// Phoenix adapter vendor ID
pub const PHOENIX_VENDOR_ID: u16 = 0x1781;

/// Phoenix adapter product ID
pub const PHOENIX_PRODUCT_ID: u16 = 0x0898;

/// Interface carrying the report endpoint
pub const PHOENIX_INTERFACE: u8 = 0;

/// Configuration selected before claiming the interface
pub const PHOENIX_CONFIGURATION: u8 = 1;

/// Endpoint 1, device-to-host
pub const PHOENIX_REPORT_ENDPOINT: u8 = 0x81;

/// Bulk read timeout used when none is configured
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Attached adapter as found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub bus_number: u8,
    pub address: u8,
    /// Display name: the device address as a decimal string.
    pub name: String,
    /// Report size advertised by the device.
    pub max_packet_size: u16,
}

/// Returns `true` if the ids belong to a Phoenix adapter.
#[must_use]
pub fn is_phoenix(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == PHOENIX_VENDOR_ID && product_id == PHOENIX_PRODUCT_ID
}

/// Builds the descriptor of an attached device if its ids match the adapter.
#[must_use]
pub fn phoenix_device_info(
    bus_number: u8,
    address: u8,
    vendor_id: u16,
    product_id: u16,
    max_packet_size: u16,
) -> Option<DeviceInfo> {
    if !is_phoenix(vendor_id, product_id) {
        return None;
    }

    Some(DeviceInfo {
        bus_number,
        address,
        name: address.to_string(),
        max_packet_size,
    })
}

/// libusb-backed bus access.
///
/// Holds its own libusb context. If libusb cannot be initialized the bus
/// stays usable: enumeration finds nothing and opening fails.
#[derive(Debug, Clone)]
pub struct RusbBus {
    context: Option<Context>,
    read_timeout: Duration,
}

impl Default for RusbBus {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl RusbBus {
    /// Creates a bus whose handles time out bulk reads after `read_timeout`.
    #[must_use]
    pub fn new(read_timeout: Duration) -> Self {
        let context = match Context::new() {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("Failed to initialize libusb: {}", e);
                None
            }
        };

        Self {
            context,
            read_timeout,
        }
    }

    /// Configured bulk read timeout
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl UsbBus for RusbBus {
    type Handle = PhoenixHandle;

    fn enumerate(&self) -> Vec<DeviceInfo> {
        let Some(context) = &self.context else {
            return Vec::new();
        };

        let devices = match context.devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to list USB devices: {}", e);
                return Vec::new();
            }
        };

        devices
            .iter()
            .filter_map(|device| {
                let descriptor = match device.device_descriptor() {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        debug!(
                            "Could not read descriptor of {:03}/{:03}: {}",
                            device.bus_number(),
                            device.address(),
                            e
                        );
                        return None;
                    }
                };

                debug!(
                    "Found USB device {:03}/{:03} (vendor: 0x{:04x}, product: 0x{:04x})",
                    device.bus_number(),
                    device.address(),
                    descriptor.vendor_id(),
                    descriptor.product_id()
                );

                let mut info = phoenix_device_info(
                    device.bus_number(),
                    device.address(),
                    descriptor.vendor_id(),
                    descriptor.product_id(),
                    u16::from(descriptor.max_packet_size()),
                )?;
                if let Some(size) = report_packet_size(&device) {
                    info.max_packet_size = size;
                }
                Some(info)
            })
            .collect()
    }

    fn open(&self, device: &DeviceInfo) -> Result<PhoenixHandle> {
        let context = self.context.as_ref().ok_or_else(|| {
            PhoenixError::DeviceOpen(format!(
                "Cannot open device {}: libusb is not available",
                device.name
            ))
        })?;
        PhoenixHandle::open(context, device, self.read_timeout)
    }
}

/// Max packet size of the report endpoint, if the configuration lists it.
fn report_packet_size<T: UsbContext>(device: &Device<T>) -> Option<u16> {
    let config = device.config_descriptor(0).ok()?;
    config
        .interfaces()
        .flat_map(|interface| interface.descriptors())
        .flat_map(|descriptor| {
            descriptor
                .endpoint_descriptors()
                .map(|endpoint| (endpoint.address(), endpoint.max_packet_size()))
                .collect::<Vec<_>>()
        })
        .find(|(address, _)| *address == PHOENIX_REPORT_ENDPOINT)
        .map(|(_, size)| size)
}

/// Interface operations needed to undo an open.
trait InterfaceControl {
    fn release_interface(&mut self, iface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()>;
}

impl<T: UsbContext> InterfaceControl for DeviceHandle<T> {
    fn release_interface(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, iface)
    }

    fn attach_kernel_driver(&mut self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, iface)
    }
}

/// What an open acquired on the report interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InterfaceClaim {
    claimed: bool,
    detached_kernel_driver: bool,
}

impl InterfaceClaim {
    /// Releases the interface, then re-attaches the kernel driver if it was
    /// detached, even when the release failed. Each step runs at most once.
    fn release<C: InterfaceControl>(&mut self, control: &mut C, name: &str) -> Result<()> {
        let released = if self.claimed {
            self.claimed = false;
            control.release_interface(PHOENIX_INTERFACE).map_err(|e| {
                PhoenixError::DeviceRelease(format!(
                    "Failed to release interface {} on device {}: {}",
                    PHOENIX_INTERFACE, name, e
                ))
            })
        } else {
            Ok(())
        };

        if self.detached_kernel_driver {
            self.detached_kernel_driver = false;
            if let Err(e) = control.attach_kernel_driver(PHOENIX_INTERFACE) {
                warn!("Failed to re-attach kernel driver on device {}: {}", name, e);
            }
        }

        released
    }
}

/// Open, claimed adapter.
///
/// Dropping the handle releases the interface and re-attaches the kernel
/// driver if this handle detached it.
pub struct PhoenixHandle {
    handle: DeviceHandle<Context>,
    name: String,
    max_packet_size: usize,
    read_timeout: Duration,
    claim: InterfaceClaim,
}

impl std::fmt::Debug for PhoenixHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixHandle")
            .field("name", &self.name)
            .field("max_packet_size", &self.max_packet_size)
            .field("claimed", &self.claim.claimed)
            .finish_non_exhaustive()
    }
}

impl PhoenixHandle {
    /// Open an enumerated adapter and claim its report interface
    ///
    /// A failed kernel driver detach is tolerated: the driver may already be
    /// detached, or was never bound.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` if the device is gone or open, set configuration
    /// or claim interface fails. Anything acquired before the failure is
    /// released again.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use phoenix_usb_reader::usb::{PhoenixHandle, DEFAULT_READ_TIMEOUT};
    /// use phoenix_usb_reader::usb::transport_trait::UsbBus;
    /// use phoenix_usb_reader::usb::RusbBus;
    ///
    /// let context = rusb::Context::new()?;
    /// if let Some(device) = RusbBus::default().enumerate().first() {
    ///     let handle = PhoenixHandle::open(&context, device, DEFAULT_READ_TIMEOUT)?;
    ///     println!("Opened {:?}", handle);
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(context: &Context, info: &DeviceInfo, read_timeout: Duration) -> Result<Self> {
        let device = context
            .devices()
            .map_err(|e| PhoenixError::DeviceOpen(format!("Failed to list USB devices: {}", e)))?
            .iter()
            .find(|device| {
                device.bus_number() == info.bus_number && device.address() == info.address
            })
            .ok_or_else(|| {
                PhoenixError::DeviceOpen(format!("Device {} is no longer attached", info.name))
            })?;

        let mut handle = device
            .open()
            .map_err(|e| PhoenixError::DeviceOpen(format!("Failed to open device {}: {}", info.name, e)))?;

        let detached_kernel_driver = match handle.detach_kernel_driver(PHOENIX_INTERFACE) {
            Ok(()) => true,
            Err(e) => {
                debug!("Kernel driver not detached from device {}: {}", info.name, e);
                false
            }
        };

        // From here on Drop undoes whatever has been acquired.
        let mut phoenix = PhoenixHandle {
            handle,
            name: info.name.clone(),
            max_packet_size: usize::from(info.max_packet_size),
            read_timeout,
            claim: InterfaceClaim {
                claimed: false,
                detached_kernel_driver,
            },
        };

        phoenix
            .handle
            .set_active_configuration(PHOENIX_CONFIGURATION)
            .map_err(|e| {
                PhoenixError::DeviceOpen(format!(
                    "Failed to set configuration {} on device {}: {}",
                    PHOENIX_CONFIGURATION, info.name, e
                ))
            })?;

        phoenix.handle.claim_interface(PHOENIX_INTERFACE).map_err(|e| {
            PhoenixError::DeviceOpen(format!(
                "Failed to claim interface {} on device {}: {}",
                PHOENIX_INTERFACE, info.name, e
            ))
        })?;
        phoenix.claim.claimed = true;

        info!("Opened Phoenix USB adapter {}", info.name);
        Ok(phoenix)
    }

    /// Display name of the opened adapter
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ReportSource for PhoenixHandle {
    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self
            .handle
            .read_bulk(PHOENIX_REPORT_ENDPOINT, buf, self.read_timeout)
        {
            Ok(len) => Ok(len),
            Err(rusb::Error::Timeout) => Err(PhoenixError::TransportRead(format!(
                "Timed out after {} ms",
                self.read_timeout.as_millis()
            ))),
            Err(e) => Err(PhoenixError::TransportRead(format!("Bulk read failed: {}", e))),
        }
    }

    fn release(&mut self) -> Result<()> {
        let was_claimed = self.claim.claimed;
        self.claim.release(&mut self.handle, &self.name)?;
        if was_claimed {
            info!("Released Phoenix USB adapter {}", self.name);
        }
        Ok(())
    }
}

impl Drop for PhoenixHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}", e);
        }
    }
}
