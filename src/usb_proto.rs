// derived from /usr/include/linux/usb/ch9.h

use std::fmt::{Display, Formatter};
use std::io::Write;

use anyhow::Error;
use libusb1_sys::constants::*;
use num_traits::FromPrimitive;

// 9.3 USB Device Requests
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum XferDir {
    ToDev = 0x00,
    ToHost = 0x80,
}
pub const USB_DIR_MASK: u8 = 0x1 << 7;

#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum XferType {
    Std = 0x00,
    Class = 0x20,
    Vendor = 0x40,
    Reserved = 0x60,
}
pub const USB_XFER_TYPE_MASK: u8 = 0x03 << 5;

#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum Recip {
    Dev = 0x00,
    Iface = 0x01,
    Ep = 0x02,
    Other = 0x03,
}
pub const USB_RECIP_MASK: u8 = 0x1f;

// 9.4 Standard Device Requests
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum StdRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0a,
    SetInterface = 0x0b,
    SynchFrame = 0x0c,
}

#[derive(Debug, Clone, Copy, FromPrimitive)]
#[repr(u8)]
pub enum UsbDescriptorTypes {
    Device = 0x01,
    Config = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfig = 0x07,
    InterfacePower = 0x08,
    Otg = 0x09,
    Debug = 0x0a,
    InterfaceAssociation = 0x0b,
    CsDevice = 0x21,
    CsConfig = 0x22,
    CsString = 0x23,
    CsInterface = 0x24,
    CsEndpoint = 0x25,
}

/// Endpoint address of the default control pipe, OUT direction.
pub const EP0_OUT: u8 = 0x00;

/// 9.6.1 bmAttributes D7 must be set on USB 2.0 devices.
pub const USB_CONFIG_BUS_POWERED: u8 = 0x80;

pub fn config_power_ma(ma: u16) -> u8 {
    (ma / 2) as u8
}

pub fn ep_in(num: u8) -> u8 {
    (num & LIBUSB_ENDPOINT_ADDRESS_MASK) | LIBUSB_ENDPOINT_IN
}

/// The 8 byte header of every control transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

impl SetupPacket {
    pub fn new(bm_request_type: u8, b_request: u8, w_value: u16, w_index: u16, w_length: u16) -> SetupPacket {
        SetupPacket { bm_request_type, b_request, w_value, w_index, w_length }
    }

    pub fn deserialize(mut buffer: &mut &[u8]) -> Result<SetupPacket, Error> {
        let format = structure!("<BBHHH");
        let (bm_request_type, b_request, w_value, w_index, w_length) = format.unpack_from(&mut buffer)?;
        Ok(SetupPacket { bm_request_type, b_request, w_value, w_index, w_length })
    }

    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBHHH");
        format.pack_into(&mut buffer, self.bm_request_type, self.b_request, self.w_value, self.w_index, self.w_length)?;
        Ok(())
    }

    pub fn dir(&self) -> XferDir {
        if self.bm_request_type & USB_DIR_MASK == 0 { XferDir::ToDev } else { XferDir::ToHost }
    }

    pub fn xfer_type(&self) -> XferType {
        // two bits wide, every value maps
        FromPrimitive::from_u8(self.bm_request_type & USB_XFER_TYPE_MASK).unwrap_or(XferType::Reserved)
    }

    /// None for the reserved recipients 4..=31.
    pub fn recip(&self) -> Option<Recip> {
        FromPrimitive::from_u8(self.bm_request_type & USB_RECIP_MASK)
    }

    /// Control selector, descriptor type or similar, depending on the request.
    pub fn value_hi(&self) -> u8 {
        (self.w_value >> 8) as u8
    }

    pub fn value_lo(&self) -> u8 {
        self.w_value as u8
    }
}

impl Display for SetupPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bmRequest: {:#04x} bRequest: {:#04x} wIndex: {:#06x} wValue: {:#06x} wLength: {}",
               self.bm_request_type, self.b_request, self.w_index, self.w_value, self.w_length)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorDevQualifier {
    pub bcd_usb: u16,
    pub b_device_class: u8,
    pub b_device_sub_class: u8,
    pub b_device_protocol: u8,
    pub b_max_packet_size0: u8,
    pub b_num_configurations: u8,
    pub b_reserved: u8,
}

impl DescriptorDevQualifier {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBHBBBBBB");
        format.pack_into(&mut buffer, format.size() as u8, UsbDescriptorTypes::DeviceQualifier as u8,
                         self.bcd_usb, self.b_device_class, self.b_device_sub_class, self.b_device_protocol,
                         self.b_max_packet_size0, self.b_num_configurations, self.b_reserved,
        )?;
        Ok(())
    }
    pub fn size(&self) -> usize {
        structure!("<BBHBBBBBB").size()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorConfig {
    pub w_total_length: u16,
    pub b_num_interfaces: u8,
    pub b_configuration_value: u8,
    pub i_configuration: u8,
    pub bm_attributes: u8,
    pub b_max_power: u8,
}

impl DescriptorConfig {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBHBBBBB");
        format.pack_into(&mut buffer, format.size() as u8, UsbDescriptorTypes::Config as u8, self.w_total_length, self.b_num_interfaces, self.b_configuration_value, self.i_configuration,
                         self.bm_attributes, self.b_max_power,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorInterface {
    pub b_interface_number: u8,
    pub b_alternate_setting: u8,
    pub b_num_endpoints: u8,
    pub b_interface_class: u8,
    pub b_interface_sub_class: u8,
    pub b_interface_protocol: u8,
    pub i_interface: u8,
}

impl DescriptorInterface {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBBBBBB");
        format.pack_into(&mut buffer, format.size() as u8, UsbDescriptorTypes::Interface as u8, self.b_interface_number, self.b_alternate_setting, self.b_num_endpoints, self.b_interface_class,
                         self.b_interface_sub_class, self.b_interface_protocol, self.i_interface,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UsbInterfaceAssocDescriptor {
    pub b_first_interface: u8,
    pub b_interface_count: u8,
    pub b_function_class: u8,
    pub b_function_sub_class: u8,
    pub b_function_protocol: u8,
    pub i_function: u8,
}

impl UsbInterfaceAssocDescriptor {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBBBBB");
        format.pack_into(&mut buffer, format.size() as u8, UsbDescriptorTypes::InterfaceAssociation as u8, self.b_first_interface, self.b_interface_count, self.b_function_class,
                         self.b_function_sub_class, self.b_function_protocol, self.i_function,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointAttrTransferType {
    Control     = 0x00,
    Isochronous = 0x01,
    Bulk        = 0x02,
    Interrupt   = 0x03,
}

#[derive(Debug, Clone, Copy)]
pub enum EndpointAttrSyncType {
    NoSync  = 0x00,
    Async   = 0x01,
    Adapt   = 0x02,
    Sync    = 0x03,
}

#[derive(Debug, Clone, Copy)]
pub enum EndpointAttrUsageType {
    Data        = 0x00,
    Feedback    = 0x01,
    Implicit    = 0x02,
    Reserved    = 0x03,
}

pub fn ep_attr_to_u8(transfer: EndpointAttrTransferType, sync: EndpointAttrSyncType, usage: EndpointAttrUsageType) -> u8 {
    let mut res = 0u8;
    res |= transfer as u8;
    res |= (sync as u8) << 2;
    res |= (usage as u8) << 4;
    res
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorEndpoint {
    pub b_endpoint_address: u8,
    pub bm_attributes: u8,
    pub w_max_packet_size: u16,
    pub b_interval: u8,
}

impl DescriptorEndpoint {
    pub fn is_in(&self) -> bool {
        self.b_endpoint_address & LIBUSB_ENDPOINT_DIR_MASK == LIBUSB_ENDPOINT_IN
    }
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBHB");
        format.pack_into(&mut buffer,
                         self.size() as u8, UsbDescriptorTypes::Endpoint as u8,
                         self.b_endpoint_address, self.bm_attributes, self.w_max_packet_size, self.b_interval
        )?;
        Ok(())
    }
    pub fn size(&self) -> usize {
        structure!("<BBBBHB").size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_packet_fields() {
        let bytes = [0xa1u8, 0x81, 0x00, 0x01, 0x01, 0x00, 0x22, 0x00];
        let mut slice = &bytes[..];
        let req = SetupPacket::deserialize(&mut slice).expect("Could not deserialize");

        assert_eq!(req.dir(), XferDir::ToHost);
        assert_eq!(req.xfer_type(), XferType::Class);
        assert_eq!(req.recip(), Some(Recip::Iface));
        assert_eq!(req.b_request, 0x81);
        assert_eq!(req.w_value, 256);
        assert_eq!(req.value_hi(), 0x01);
        assert_eq!(req.w_index, 1);
        assert_eq!(req.w_length, 34);

        let mut out = vec![];
        req.serialize(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn setup_packet_reserved_recipient() {
        let req = SetupPacket::new(0x05, 0x00, 0, 0, 0);
        assert_eq!(req.recip(), None);
        assert_eq!(req.xfer_type(), XferType::Std);
        assert_eq!(req.dir(), XferDir::ToDev);
    }

    #[test]
    fn setup_packet_too_short() {
        let bytes = [0x21u8, 0x01, 0x00];
        let mut slice = &bytes[..];
        assert!(SetupPacket::deserialize(&mut slice).is_err());
    }

    #[test]
    fn endpoint_descriptor_layout() {
        let ep = DescriptorEndpoint {
            b_endpoint_address: ep_in(1),
            bm_attributes: ep_attr_to_u8(EndpointAttrTransferType::Isochronous, EndpointAttrSyncType::Async, EndpointAttrUsageType::Data),
            w_max_packet_size: 512,
            b_interval: 1,
        };
        let mut out = vec![];
        ep.serialize(&mut out).unwrap();
        assert!(ep.is_in());
        assert_eq!(out, vec![0x07, 0x05, 0x81, 0x05, 0x00, 0x02, 0x01]);
    }

    #[test]
    fn bus_power_encoding() {
        assert_eq!(config_power_ma(500), 250);
        assert_eq!(config_power_ma(100), 50);
    }
}
