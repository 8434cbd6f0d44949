use std::fmt;
use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};

use crate::stlink::StlinkError;

/// The USB command packet size. Shorter command frames are padded; the
/// dongle ignores trailing bytes.
const CMD_LEN: usize = 16;

/// The USB VendorID of STMicro.
pub const USB_VID: u16 = 0x0483;
/// The USB ProductID of the STLink v2.
pub const USB_PID: u16 = 0x3748;
/// The USB ProductID of the original STLink, which speaks SCSI instead of
/// bulk endpoints and is not driven by this crate.
pub const USB_PID_V1: u16 = 0x3744;

/// The sole USB configuration of the dongle.
const USB_CONFIGURATION: u8 = 1;

/// Bulk OUT endpoint carrying command frames and host-to-device payloads.
const EP_OUT: u8 = 0x02;
/// Bulk IN endpoint carrying responses.
const EP_IN: u8 = 0x81;
/// A third, apparently unused, bulk IN endpoint.
const EP_UNUSED: u8 = 0x83;

/// Most commands complete in a few milliseconds; the slowest take around
/// 250 ms. 800 ms is generous.
pub const TIMEOUT: Duration = Duration::from_millis(800);

/// Ceiling for a single data phase. The dongle's own RAM limits transfers
/// to about 6 KiB; staying under that avoids probing for its fencepost
/// bugs.
pub const DATA_BUF_LEN: usize = 6 * 1024 + 4;

/// Bulk-endpoint transfer primitive of the STLink v2.
///
/// The trait exists so that the protocol and flash layers can be exercised
/// against an emulated target.
pub trait StLinkUsb: fmt::Debug {
    /// Sends `cmd` (padded to 16 bytes) on the OUT endpoint, then transfers
    /// the optional data phase: `write_data` out, or `read_data` filled
    /// from the IN endpoint.
    fn write(
        &mut self,
        cmd: &[u8],
        write_data: &[u8],
        read_data: &mut [u8],
        timeout: Duration,
    ) -> Result<(), StlinkError>;

    /// Closes the handle and re-enumerates the device. Needed after a
    /// DFU exit, which drops the dongle off the bus.
    fn reopen(&mut self) -> Result<(), StlinkError>;
}

/// Provides low-level USB enumeration and transfers for STLink v2 devices.
pub struct STLinkUSBDevice {
    device_handle: DeviceHandle<Context>,
}

impl fmt::Debug for STLinkUSBDevice {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("STLinkUSBDevice")
            .field("device_handle", &"DeviceHandle<rusb::Context>")
            .finish()
    }
}

fn open_device() -> Result<DeviceHandle<Context>, StlinkError> {
    let context = Context::new()?;

    log::debug!("Acquired libusb context.");

    let device = context
        .devices()?
        .iter()
        .find(|device| {
            device
                .device_descriptor()
                .map(|desc| desc.vendor_id() == USB_VID && desc.product_id() == USB_PID)
                .unwrap_or(false)
        })
        .ok_or(StlinkError::ProbeNotFound)?;

    let mut device_handle = device.open()?;

    log::debug!(
        "Found an STLink v2 on bus {} device {}.",
        device.bus_number(),
        device.address()
    );

    device_handle.reset()?;
    device_handle.set_active_configuration(USB_CONFIGURATION)?;
    device_handle.claim_interface(0)?;

    log::debug!("Claimed interface 0 of the STLink.");

    let config = device.active_config_descriptor()?;

    let mut endpoint_out = false;
    let mut endpoint_in = false;
    let mut endpoint_unused = false;

    if let Some(interface) = config.interfaces().next() {
        if let Some(descriptor) = interface.descriptors().next() {
            for endpoint in descriptor.endpoint_descriptors() {
                match endpoint.address() {
                    EP_OUT => endpoint_out = true,
                    EP_IN => endpoint_in = true,
                    EP_UNUSED => endpoint_unused = true,
                    _ => {}
                }
            }
        }
    }

    if !endpoint_out || !endpoint_in || !endpoint_unused {
        return Err(StlinkError::EndpointNotFound);
    }

    Ok(device_handle)
}

impl STLinkUSBDevice {
    /// Scans the USB bus for an STLink v2 and claims it.
    pub fn new() -> Result<Self, StlinkError> {
        Ok(Self {
            device_handle: open_device()?,
        })
    }
}

impl StLinkUsb for STLinkUSBDevice {
    fn write(
        &mut self,
        cmd: &[u8],
        write_data: &[u8],
        read_data: &mut [u8],
        timeout: Duration,
    ) -> Result<(), StlinkError> {
        log::trace!("Sending command {:02x?}, timeout {:?}.", cmd, timeout);

        // Command phase.
        assert!(cmd.len() <= CMD_LEN);
        let mut padded_cmd = [0u8; CMD_LEN];
        padded_cmd[..cmd.len()].copy_from_slice(cmd);

        let written = self
            .device_handle
            .write_bulk(EP_OUT, &padded_cmd, timeout)?;
        if written != CMD_LEN {
            // The dongle ignores trailing command bytes anyway.
            log::warn!(
                "Mismatched USB transfer for command {:#04x}, sent {} of {} bytes.",
                cmd[0],
                written,
                CMD_LEN
            );
        }

        // Optional data out phase.
        if !write_data.is_empty() {
            let written = self.device_handle.write_bulk(EP_OUT, write_data, timeout)?;
            if written != write_data.len() {
                return Err(StlinkError::NotEnoughBytesWritten {
                    is: written,
                    should: write_data.len(),
                });
            }
        }

        // Optional data in phase.
        if !read_data.is_empty() {
            let read = self.device_handle.read_bulk(EP_IN, read_data, timeout)?;
            if read != read_data.len() {
                return Err(StlinkError::NotEnoughBytesRead {
                    is: read,
                    should: read_data.len(),
                });
            }
        }

        Ok(())
    }

    fn reopen(&mut self) -> Result<(), StlinkError> {
        log::debug!("Reopening the STLink USB device.");
        let _ = self.device_handle.release_interface(0);
        self.device_handle = open_device()?;
        Ok(())
    }
}

impl Drop for STLinkUSBDevice {
    fn drop(&mut self) {
        // We ignore the error case as we can't do much about it anyways.
        let _ = self.device_handle.release_interface(0);
    }
}
