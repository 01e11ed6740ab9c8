use std::fmt;

use anyhow::Error;
use libusb1_sys::constants::LIBUSB_CLASS_VIDEO;

use crate::config::{TransferMode, VideoCapabilities};
use crate::usb_proto::{config_power_ma, ep_attr_to_u8, ep_in, DescriptorConfig, DescriptorDevQualifier, DescriptorEndpoint, DescriptorInterface, EndpointAttrSyncType, EndpointAttrTransferType, EndpointAttrUsageType, UsbInterfaceAssocDescriptor, USB_CONFIG_BUS_POWERED};
use crate::uvc_proto::{DescriptorUvcFormatMjpeg, DescriptorUvcFrameMjpeg, DescriptorUvcInputHeader, FrameIntervals, UvcCameraTerminalDescriptor, UvcColorMatchingDescriptor, UvcHeaderDescriptor, UvcInterfaceProtocol, UvcInterfaceSubClass, UvcOutputTerminalDescriptor, TT_STREAMING, UVC_VERSION};

/// wTotalLength the host is told for each transport, the built tables must match these exactly.
pub const ISOC_CONFIG_DESC_SIZE: u16 = 159;
pub const BULK_CONFIG_DESC_SIZE: u16 = 150;

/// Start of the block returned for a class specific GET_DESCRIPTOR.
pub const CLASS_DESCRIPTOR_OFFSET: usize = 18;

pub const VC_IF_NUM: u8 = 0;
pub const VS_IF_NUM: u8 = 1;
pub const VIDEO_TOTAL_IF_NUM: u8 = 2;

/// Alternate setting of the streaming interface that carries bandwidth.
pub const ALT_SETTING_STREAMING: u8 = 1;

const CAMERA_TERMINAL_ID: u8 = 1;
const OUTPUT_TERMINAL_ID: u8 = 2;
const FUNCTION_STRING_IDX: u8 = 2;

pub fn declared_config_size(mode: TransferMode) -> u16 {
    match mode {
        TransferMode::Isochronous => ISOC_CONFIG_DESC_SIZE,
        TransferMode::Bulk => BULK_CONFIG_DESC_SIZE,
    }
}

#[derive(Debug, Clone)]
pub enum DescriptorTypes {
    Root(),
    Config(DescriptorConfig),
    DevQualifier(DescriptorDevQualifier),
    InterfaceAssociation(UsbInterfaceAssocDescriptor),
    Interface(DescriptorInterface),
    Endpoint(DescriptorEndpoint),
    UvcHeaderDescriptor(UvcHeaderDescriptor),
    UvcVcCameraTerminal(UvcCameraTerminalDescriptor),
    UvcVcOutputTerminal(UvcOutputTerminalDescriptor),
    UvcInputHeader(DescriptorUvcInputHeader),
    DescriptorUvcFormatMjpeg(DescriptorUvcFormatMjpeg),
    DescriptorUvcFrameMjpeg(DescriptorUvcFrameMjpeg),
    UvcColorMatching(UvcColorMatchingDescriptor),
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub children: Vec<TreeNode>,
    pub parsed: DescriptorTypes,
}

impl TreeNode {
    pub fn leaf(parsed: DescriptorTypes) -> TreeNode {
        TreeNode { children: vec![], parsed }
    }

    pub fn node(parsed: DescriptorTypes, children: Vec<TreeNode>) -> TreeNode {
        TreeNode { children, parsed }
    }

    pub fn find_ifaces(&self) -> Vec<u8> {
        let mut ids = match self.parsed {
            DescriptorTypes::Interface(iface) if iface.b_alternate_setting == 0 => vec![iface.b_interface_number],
            _ => vec![]
        };
        for child in self.children.iter() {
            ids.append(&mut child.find_ifaces());
        }
        ids
    }

    pub fn num_frames(&self) -> usize {
        self.children.iter().filter(|child| matches!(child.parsed, DescriptorTypes::DescriptorUvcFrameMjpeg(_))).count()
    }

    /// Recomputes every length and count field from the descriptors actually present below it.
    pub fn fix_tree(&mut self) -> Result<(), Error> {
        for child in self.children.iter_mut() {
            child.fix_tree()?;
        }

        let mut tmp_buf = vec![];
        self.serialize(&mut tmp_buf)?;
        let iface_cnt = self.find_ifaces().len();
        let frame_cnt = self.num_frames();

        match &mut self.parsed {
            DescriptorTypes::Config(conf) => {
                conf.w_total_length = tmp_buf.len() as u16;
                conf.b_num_interfaces = iface_cnt as u8;
            }
            DescriptorTypes::UvcHeaderDescriptor(hdr) => {
                hdr.w_total_length = tmp_buf.len() as u16;
            }
            DescriptorTypes::UvcInputHeader(hdr) => {
                hdr.w_total_length = tmp_buf.len() as u16;
            }
            DescriptorTypes::DescriptorUvcFormatMjpeg(fmt) => {
                fmt.b_num_frame_descriptors = frame_cnt as u8;
            }
            _ => (),
        }
        Ok(())
    }

    pub fn serialize(&self, buffer: &mut Vec<u8>) -> Result<(), Error> {
        match &self.parsed {
            DescriptorTypes::Root() => (),
            DescriptorTypes::Config(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::DevQualifier(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::InterfaceAssociation(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::Interface(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::Endpoint(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::UvcHeaderDescriptor(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::UvcVcCameraTerminal(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::UvcVcOutputTerminal(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::UvcInputHeader(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::DescriptorUvcFormatMjpeg(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::DescriptorUvcFrameMjpeg(desc) => desc.serialize(&mut *buffer)?,
            DescriptorTypes::UvcColorMatching(desc) => desc.serialize(&mut *buffer)?,
        }
        for child in self.children.iter() {
            child.serialize(buffer)?;
        }
        Ok(())
    }
}

trait RecursiveDisplay {
    fn recursive_fmt(&self, f: &mut fmt::Formatter<'_>, depth: u32) -> fmt::Result;
}

impl RecursiveDisplay for TreeNode {
    fn recursive_fmt(&self, f: &mut fmt::Formatter<'_>, depth: u32) -> fmt::Result {
        write!(f, "{}{:?}\n", (0..depth).map(|_| "\t").collect::<String>(), self.parsed)?;
        for child in self.children.iter() {
            child.recursive_fmt(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.recursive_fmt(f, 0)
    }
}

fn vs_interface(alt: u8, num_endpoints: u8) -> DescriptorTypes {
    DescriptorTypes::Interface(DescriptorInterface {
        b_interface_number: VS_IF_NUM,
        b_alternate_setting: alt,
        b_num_endpoints: num_endpoints,
        b_interface_class: LIBUSB_CLASS_VIDEO,
        b_interface_sub_class: UvcInterfaceSubClass::VideoStreaming as u8,
        b_interface_protocol: UvcInterfaceProtocol::Undefined as u8,
        i_interface: 0,
    })
}

fn data_endpoint(caps: &VideoCapabilities) -> TreeNode {
    let (sync, b_interval) = match caps.transfer_mode {
        TransferMode::Isochronous => (EndpointAttrSyncType::Async, 1),
        TransferMode::Bulk => (EndpointAttrSyncType::NoSync, 0),
    };
    TreeNode::leaf(DescriptorTypes::Endpoint(DescriptorEndpoint {
        b_endpoint_address: ep_in(caps.data_ep_num),
        bm_attributes: ep_attr_to_u8(caps.transfer_mode.ep_transfer_type(), sync, EndpointAttrUsageType::Data),
        w_max_packet_size: caps.packet_size,
        b_interval,
    }))
}

fn video_control_interface(caps: &VideoCapabilities) -> TreeNode {
    let header = TreeNode::node(DescriptorTypes::UvcHeaderDescriptor(UvcHeaderDescriptor {
        bcd_uvc: UVC_VERSION,
        w_total_length: 0,
        dw_clock_frequency: caps.clock_frequency,
        ba_interface_nr: vec![VS_IF_NUM],
    }), vec![
        TreeNode::leaf(DescriptorTypes::UvcVcCameraTerminal(UvcCameraTerminalDescriptor {
            b_terminal_id: CAMERA_TERMINAL_ID,
            b_assoc_terminal: 0,
            i_terminal: 0,
            w_objective_focal_length_min: 0,
            w_objective_focal_length_max: 0,
            w_ocular_focal_length: 0,
            bm_controls: vec![0x00, 0x00],
        })),
        TreeNode::leaf(DescriptorTypes::UvcVcOutputTerminal(UvcOutputTerminalDescriptor {
            b_terminal_id: OUTPUT_TERMINAL_ID,
            w_terminal_type: TT_STREAMING,
            b_assoc_terminal: 0,
            b_source_id: CAMERA_TERMINAL_ID,
            i_terminal: 0,
        })),
    ]);

    TreeNode::node(DescriptorTypes::Interface(DescriptorInterface {
        b_interface_number: VC_IF_NUM,
        b_alternate_setting: 0,
        b_num_endpoints: 0,
        b_interface_class: LIBUSB_CLASS_VIDEO,
        b_interface_sub_class: UvcInterfaceSubClass::VideoControl as u8,
        b_interface_protocol: UvcInterfaceProtocol::Undefined as u8,
        i_interface: FUNCTION_STRING_IDX,
    }), vec![header])
}

fn mjpeg_format(caps: &VideoCapabilities) -> TreeNode {
    let frame = TreeNode::leaf(DescriptorTypes::DescriptorUvcFrameMjpeg(DescriptorUvcFrameMjpeg {
        b_frame_index: 1,
        bm_capabilities: 0,
        w_width: caps.width,
        w_height: caps.height,
        dw_min_bit_rate: caps.min_bit_rate,
        dw_max_bit_rate: caps.max_bit_rate,
        dw_max_video_frame_buffer_size: caps.max_frame_size,
        dw_default_frame_interval: caps.default_frame_interval,
        frame_intervals: FrameIntervals::Continuous {
            min: caps.min_frame_interval,
            max: caps.max_frame_interval,
            step: 0,
        },
    }));

    TreeNode::node(DescriptorTypes::DescriptorUvcFormatMjpeg(DescriptorUvcFormatMjpeg {
        b_format_index: 1,
        b_num_frame_descriptors: 0,
        bm_flags: 0x01,
        b_default_frame_index: 1,
        b_aspect_ratio_x: 0,
        b_aspect_ratio_y: 0,
        bm_interface_flags: 0,
        b_copy_protect: 0,
    }), vec![frame])
}

fn video_streaming_interfaces(caps: &VideoCapabilities) -> Vec<TreeNode> {
    let input_header = TreeNode::node(DescriptorTypes::UvcInputHeader(DescriptorUvcInputHeader {
        w_total_length: 0,
        b_endpoint_address: ep_in(caps.data_ep_num),
        bm_info: 0,
        b_terminal_link: OUTPUT_TERMINAL_ID,
        b_still_capture_method: 2,
        b_trigger_support: 1,
        b_trigger_usage: 0,
        b_control_size: 1,
        bma_controls: vec![0x00],
    }), vec![
        mjpeg_format(caps),
        TreeNode::leaf(DescriptorTypes::UvcColorMatching(UvcColorMatchingDescriptor {
            b_color_primaries: 0,
            b_transfer_characteristics: 0,
            b_matrix_coefficients: 0,
        })),
    ]);

    match caps.transfer_mode {
        TransferMode::Bulk => vec![
            TreeNode::node(vs_interface(0, 1), vec![data_endpoint(caps), input_header]),
        ],
        TransferMode::Isochronous => vec![
            TreeNode::node(vs_interface(0, 0), vec![input_header]),
            TreeNode::node(vs_interface(ALT_SETTING_STREAMING, 1), vec![data_endpoint(caps)]),
        ],
    }
}

pub fn config_tree(caps: &VideoCapabilities) -> TreeNode {
    let mut ifaces = vec![video_control_interface(caps)];
    ifaces.append(&mut video_streaming_interfaces(caps));

    let iad = TreeNode::node(DescriptorTypes::InterfaceAssociation(UsbInterfaceAssocDescriptor {
        b_first_interface: VC_IF_NUM,
        b_interface_count: VIDEO_TOTAL_IF_NUM,
        b_function_class: LIBUSB_CLASS_VIDEO,
        b_function_sub_class: UvcInterfaceSubClass::VideoInterfaceCollection as u8,
        b_function_protocol: UvcInterfaceProtocol::Undefined as u8,
        i_function: FUNCTION_STRING_IDX,
    }), ifaces);

    let config = TreeNode::node(DescriptorTypes::Config(DescriptorConfig {
        w_total_length: 0,
        b_num_interfaces: 0,
        b_configuration_value: 1,
        i_configuration: 0,
        bm_attributes: USB_CONFIG_BUS_POWERED,
        b_max_power: config_power_ma(caps.max_power_ma),
    }), vec![iad]);

    TreeNode::node(DescriptorTypes::Root(), vec![config])
}

pub fn build_configuration_descriptor(caps: &VideoCapabilities) -> Result<Vec<u8>, Error> {
    let mut root = config_tree(caps);
    root.fix_tree()?;
    debug!("configuration descriptor tree:\n{}", root);

    let mut bytes = vec![];
    root.serialize(&mut bytes)?;
    debug_assert_eq!(bytes.len(), declared_config_size(caps.transfer_mode) as usize);
    Ok(bytes)
}

pub fn build_device_qualifier_descriptor() -> Result<Vec<u8>, Error> {
    let root = TreeNode::leaf(DescriptorTypes::DevQualifier(DescriptorDevQualifier {
        bcd_usb: 0x0200,
        b_device_class: 0x00,
        b_device_sub_class: 0x00,
        b_device_protocol: 0x00,
        b_max_packet_size0: 0x40,
        b_num_configurations: 0x01,
        b_reserved: 0x00,
    }));
    let mut bytes = vec![];
    root.serialize(&mut bytes)?;
    Ok(bytes)
}
