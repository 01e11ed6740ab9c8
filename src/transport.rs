use anyhow::Error;

use crate::usb_proto::EndpointAttrTransferType;

/// Endpoint kinds the class opens on the device controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl From<EndpointAttrTransferType> for EndpointType {
    fn from(t: EndpointAttrTransferType) -> Self {
        match t {
            EndpointAttrTransferType::Control => EndpointType::Control,
            EndpointAttrTransferType::Isochronous => EndpointType::Isochronous,
            EndpointAttrTransferType::Bulk => EndpointType::Bulk,
            EndpointAttrTransferType::Interrupt => EndpointType::Interrupt,
        }
    }
}

/// Primitives the device controller core offers a class driver.
///
/// Control transfers always go through endpoint 0, the core owns the setup/data/status sequencing.
pub trait UsbTransport {
    fn open_ep(&mut self, ep_addr: u8, ep_type: EndpointType, max_packet_size: u16) -> Result<(), Error>;
    fn close_ep(&mut self, ep_addr: u8) -> Result<(), Error>;
    /// Drops anything queued on the endpoint.
    fn flush_ep(&mut self, ep_addr: u8) -> Result<(), Error>;
    /// Starts the IN data stage of the current control request.
    fn ctl_send_data(&mut self, data: &[u8]) -> Result<(), Error>;
    /// Arms endpoint 0 to receive `len` bytes for the OUT data stage of the current control request.
    fn ctl_prepare_rx(&mut self, len: u16) -> Result<(), Error>;
    /// Stalls the control endpoint.
    fn ctl_error(&mut self);
}
