//! Device lookup and endpoint selection
//!
//! A bridgeable device exposes exactly one interface carrying exactly two
//! endpoints: an interrupt IN endpoint first, then an interrupt OUT endpoint.
//! Anything else is rejected with the matching [`NativeError`].

use crate::error::NativeError;
use rusb::{Context, Device, DeviceHandle, Direction, EndpointDescriptor, TransferType, UsbContext};
use std::fmt;
use tracing::debug;

/// Endpoint attributes relevant to layout validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    pub address: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

impl From<&EndpointDescriptor<'_>> for EndpointSpec {
    fn from(endpoint: &EndpointDescriptor<'_>) -> Self {
        Self {
            address: endpoint.address(),
            direction: endpoint.direction(),
            transfer_type: endpoint.transfer_type(),
            max_packet_size: endpoint.max_packet_size(),
        }
    }
}

/// The interface and interrupt endpoint pair used for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptPair {
    pub interface: u8,
    pub endpoint_in: u8,
    pub endpoint_out: u8,
    pub in_packet_size: usize,
    pub out_packet_size: usize,
}

/// Short description of an attached device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: ID {:04x}:{:04x}",
            self.bus, self.address, self.vendor_id, self.product_id
        )
    }
}

/// Check an interface layout and pick its interrupt endpoints
pub fn validate_layout(
    interface: u8,
    interface_count: usize,
    endpoints: &[EndpointSpec],
) -> Result<InterruptPair, NativeError> {
    if interface_count != 1 {
        return Err(NativeError::InterfaceNotFound);
    }

    let [endpoint_in, endpoint_out] = endpoints else {
        return Err(NativeError::EndpointsNotFound);
    };

    if endpoint_in.transfer_type != TransferType::Interrupt {
        return Err(NativeError::FirstEndpointNotInterrupt);
    }
    if endpoint_in.direction != Direction::In {
        return Err(NativeError::FirstEndpointNotIn);
    }
    if endpoint_out.transfer_type != TransferType::Interrupt {
        return Err(NativeError::SecondEndpointNotInterrupt);
    }
    if endpoint_out.direction != Direction::Out {
        return Err(NativeError::SecondEndpointNotOut);
    }

    Ok(InterruptPair {
        interface,
        endpoint_in: endpoint_in.address,
        endpoint_out: endpoint_out.address,
        in_packet_size: endpoint_in.max_packet_size as usize,
        out_packet_size: endpoint_out.max_packet_size as usize,
    })
}

/// Read the active configuration of `device` and validate it
pub fn select_endpoints(device: &Device<Context>) -> Result<InterruptPair, NativeError> {
    let config = device
        .active_config_descriptor()
        .map_err(|_| NativeError::InterfaceNotFound)?;
    let interface_count = config.num_interfaces() as usize;

    let descriptor = config
        .interfaces()
        .next()
        .and_then(|interface| interface.descriptors().next())
        .ok_or(NativeError::InterfaceNotFound)?;

    let endpoints: Vec<EndpointSpec> = descriptor
        .endpoint_descriptors()
        .map(|endpoint| EndpointSpec::from(&endpoint))
        .collect();

    validate_layout(descriptor.interface_number(), interface_count, &endpoints)
}

/// Find the first device matching vendor and product id
pub fn find_device(
    context: &Context,
    vendor_id: u16,
    product_id: u16,
) -> Result<Device<Context>, NativeError> {
    let devices = context.devices().map_err(NativeError::Enumeration)?;

    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!(
                    "Skipping device {:03}:{:03}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };

        if descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id {
            return Ok(device);
        }
    }

    Err(NativeError::DeviceNotFound {
        vendor_id,
        product_id,
    })
}

/// Find, open, validate and claim a device
pub fn open_device(
    context: &Context,
    vendor_id: u16,
    product_id: u16,
) -> Result<(DeviceHandle<Context>, InterruptPair), NativeError> {
    let device = find_device(context, vendor_id, product_id)?;

    let mut handle = device.open().map_err(|e| match e {
        rusb::Error::Access => NativeError::PermissionDenied,
        other => NativeError::OpenFailed(other),
    })?;

    let pair = select_endpoints(&device)?;

    // Not supported on every platform
    if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
        debug!("Kernel driver auto-detach unavailable: {}", e);
    }

    handle
        .claim_interface(pair.interface)
        .map_err(NativeError::OpenFailed)?;

    debug!(
        "Opened {:04x}:{:04x} interface {} (in {:#04x}, out {:#04x})",
        vendor_id, product_id, pair.interface, pair.endpoint_in, pair.endpoint_out
    );
    Ok((handle, pair))
}

/// Summaries of every device the context can see
pub fn list_devices(context: &Context) -> Result<Vec<DeviceSummary>, NativeError> {
    let devices = context.devices().map_err(NativeError::Enumeration)?;

    Ok(devices
        .iter()
        .filter_map(|device| {
            let descriptor = device.device_descriptor().ok()?;
            Some(DeviceSummary {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                bus: device.bus_number(),
                address: device.address(),
            })
        })
        .collect())
}
