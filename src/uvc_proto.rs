use std::io::Write;

use anyhow::Error;
use structure::byteorder::{LittleEndian, WriteBytesExt};

use crate::usb_proto::UsbDescriptorTypes;

// UVC 1.1
// https://www.usb.org/document-library/video-class-v11-document-set
// https://github.com/torvalds/linux/blob/master/include/uapi/linux/usb/video.h

pub const UVC_VERSION: u16 = 0x0110;

#[derive(FromPrimitive)]
#[repr(u8)]
pub enum UvcInterfaceSubClass {
    Undefined = 0x00,
    VideoControl = 0x01,
    VideoStreaming = 0x02,
    VideoInterfaceCollection = 0x03,
}

#[derive(FromPrimitive)]
#[repr(u8)]
pub enum UvcInterfaceProtocol {
    Undefined = 0x00,
    Protocol15 = 0x01,
}

#[derive(FromPrimitive)]
#[repr(u8)]
pub enum UvcVsDescriptorSubtypes {
    Undefined = 0x00,
    InputHeader = 0x01,
    OutputHeader = 0x02,
    StillImageFrame = 0x03,
    FormatUncompressed = 0x04,
    FrameUncompressed = 0x05,
    FormatMjpeg = 0x06,
    FrameMjpeg = 0x07,
    FormatMpeg2ts = 0x0a,
    FormatDv = 0x0c,
    ColorFormat = 0x0d,
    FormatFrameBased = 0x10,
    FrameFrameBased = 0x11,
    FormatStreamBased = 0x12,
}

#[derive(FromPrimitive)]
#[repr(u8)]
pub enum UvcVcDescriptorSubtypes {
    UvcVcDescriptorUndefined = 0x00,
    UvcVcHeader = 0x01,
    UvcVcInputTerminal = 0x02,
    UvcVcOutputTerminal = 0x03,
    UvcVcSelectorUnit = 0x04,
    UvcVcProcessingUnit = 0x05,
    UvcVcExtensionUnit = 0x06,
}

// A.8 Video Class-Specific Request Codes
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum UvcRequestCodes {
    Undefined = 0x00,
    SetCur = 0x01,
    GetCur = 0x81,
    GetMin = 0x82,
    GetMax = 0x83,
    GetRes = 0x84,
    GetLen = 0x85,
    GetInfo = 0x86,
    GetDef = 0x87,
}

// A.9.7 VideoStreaming Interface Control Selectors
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum VsControlSelector {
    ControlUndefined = 0x00,
    ProbeControl = 0x01,
    CommitControl = 0x02,
    StillProbeControl = 0x03,
    StillCommitControl = 0x04,
    StillImageTriggerControl = 0x05,
    StreamErrorCodeControl = 0x06,
    GenerateKeyFrameControl = 0x07,
    UpdateFrameSegmentControl = 0x08,
    SyncDelayControl = 0x09,
}

impl VsControlSelector {
    /// The selector as it appears in wValue, already shifted into the high byte.
    pub fn w_value(self) -> u16 {
        (self as u16) << 8
    }
}

// B.1 - B.3 Terminal Types
pub const TT_STREAMING: u16 = 0x0101;
pub const ITT_CAMERA: u16 = 0x0201;

/// Size of the probe/commit block defined by UVC 1.1 (UVC 1.0 hosts only use the first 26 bytes).
pub const STREAMING_CONTROL_SIZE: usize = 34;

#[derive(Debug, Clone)]
pub struct UvcHeaderDescriptor {
    pub bcd_uvc: u16,
    pub w_total_length: u16,
    pub dw_clock_frequency: u32,
    pub ba_interface_nr: Vec<u8>,
}

impl UvcHeaderDescriptor {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBHHIB");
        format.pack_into(&mut buffer,
                         self.size() as u8,
                         UsbDescriptorTypes::CsInterface as u8,
                         UvcVcDescriptorSubtypes::UvcVcHeader as u8,
                         self.bcd_uvc, self.w_total_length, self.dw_clock_frequency, self.b_in_collection(),
        )?;
        buffer.write_all(&self.ba_interface_nr)?;
        Ok(())
    }
    pub fn b_in_collection(&self) -> u8 {
        self.ba_interface_nr.len() as u8
    }
    pub fn size(&self) -> usize {
        structure!("<BBBHHIB").size() + self.ba_interface_nr.len()
    }
}

/// Input terminal of type ITT_CAMERA (3.7.2.3).
#[derive(Debug, Clone)]
pub struct UvcCameraTerminalDescriptor {
    pub b_terminal_id: u8,
    pub b_assoc_terminal: u8,
    pub i_terminal: u8,
    pub w_objective_focal_length_min: u16,
    pub w_objective_focal_length_max: u16,
    pub w_ocular_focal_length: u16,
    pub bm_controls: Vec<u8>,
}

impl UvcCameraTerminalDescriptor {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBHBBHHHB");
        format.pack_into(&mut buffer,
                         self.size() as u8,
                         UsbDescriptorTypes::CsInterface as u8,
                         UvcVcDescriptorSubtypes::UvcVcInputTerminal as u8,
                         self.b_terminal_id, ITT_CAMERA, self.b_assoc_terminal, self.i_terminal,
                         self.w_objective_focal_length_min, self.w_objective_focal_length_max, self.w_ocular_focal_length,
                         self.bm_controls.len() as u8,
        )?;
        buffer.write_all(&self.bm_controls)?;
        Ok(())
    }
    pub fn size(&self) -> usize {
        structure!("<BBBBHBBHHHB").size() + self.bm_controls.len()
    }
}

#[derive(Debug, Clone)]
pub struct UvcOutputTerminalDescriptor {
    pub b_terminal_id: u8,
    pub w_terminal_type: u16,
    pub b_assoc_terminal: u8,
    pub b_source_id: u8,
    pub i_terminal: u8,
}

impl UvcOutputTerminalDescriptor {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBHBBB");
        format.pack_into(&mut buffer,
                         self.size() as u8,
                         UsbDescriptorTypes::CsInterface as u8,
                         UvcVcDescriptorSubtypes::UvcVcOutputTerminal as u8,
                         self.b_terminal_id, self.w_terminal_type,
                         self.b_assoc_terminal, self.b_source_id, self.i_terminal,
        )?;
        Ok(())
    }
    pub fn size(&self) -> usize {
        structure!("<BBBBHBBB").size()
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorUvcInputHeader {
    pub w_total_length: u16,
    pub b_endpoint_address: u8,
    pub bm_info: u8,
    pub b_terminal_link: u8,
    pub b_still_capture_method: u8,
    pub b_trigger_support: u8,
    pub b_trigger_usage: u8,
    pub b_control_size: u8,
    pub bma_controls: Vec<u8>,
}

impl DescriptorUvcInputHeader {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBHBBBBBBB");
        format.pack_into(&mut buffer, self.size() as u8, UsbDescriptorTypes::CsInterface as u8, UvcVsDescriptorSubtypes::InputHeader as u8, self.b_num_formats() as u8,
                         self.w_total_length, self.b_endpoint_address, self.bm_info, self.b_terminal_link, self.b_still_capture_method, self.b_trigger_support,
                         self.b_trigger_usage, self.b_control_size,
        )?;
        buffer.write_all(&self.bma_controls)?;
        Ok(())
    }
    pub fn b_num_formats(&self) -> usize {
        if self.b_control_size == 0 { 0 } else { self.bma_controls.len() / self.b_control_size as usize }
    }
    pub fn size(&self) -> usize {
        structure!("<BBBBHBBBBBBB").size() + self.bma_controls.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorUvcFormatMjpeg {
    pub b_format_index: u8,
    pub b_num_frame_descriptors: u8,
    pub bm_flags: u8,
    pub b_default_frame_index: u8,
    pub b_aspect_ratio_x: u8,
    pub b_aspect_ratio_y: u8,
    pub bm_interface_flags: u8,
    pub b_copy_protect: u8,
}

impl DescriptorUvcFormatMjpeg {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBBBBBBBB");
        format.pack_into(&mut buffer, format.size() as u8, UsbDescriptorTypes::CsInterface as u8, UvcVsDescriptorSubtypes::FormatMjpeg as u8, self.b_format_index, self.b_num_frame_descriptors, self.bm_flags,
                         self.b_default_frame_index, self.b_aspect_ratio_x, self.b_aspect_ratio_y, self.bm_interface_flags, self.b_copy_protect,
        )?;
        Ok(())
    }
}

/// Frame intervals in 100ns units, either a continuous range (bFrameIntervalType = 0) or a discrete list.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameIntervals {
    Continuous { min: u32, max: u32, step: u32 },
    Discrete(Vec<u32>),
}

impl FrameIntervals {
    pub fn b_frame_interval_type(&self) -> u8 {
        match self {
            FrameIntervals::Continuous { .. } => 0,
            FrameIntervals::Discrete(intervals) => intervals.len() as u8,
        }
    }

    pub fn values(&self) -> Vec<u32> {
        match self {
            FrameIntervals::Continuous { min, max, step } => vec![*min, *max, *step],
            FrameIntervals::Discrete(intervals) => intervals.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorUvcFrameMjpeg {
    pub b_frame_index: u8,
    pub bm_capabilities: u8,
    pub w_width: u16,
    pub w_height: u16,
    pub dw_min_bit_rate: u32,
    pub dw_max_bit_rate: u32,
    pub dw_max_video_frame_buffer_size: u32,
    pub dw_default_frame_interval: u32,
    pub frame_intervals: FrameIntervals,
}

impl DescriptorUvcFrameMjpeg {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBBHHIIIIB");
        format.pack_into(&mut buffer, self.size() as u8, UsbDescriptorTypes::CsInterface as u8, UvcVsDescriptorSubtypes::FrameMjpeg as u8, self.b_frame_index, self.bm_capabilities, self.w_width,
                         self.w_height, self.dw_min_bit_rate, self.dw_max_bit_rate, self.dw_max_video_frame_buffer_size, self.dw_default_frame_interval,
                         self.frame_intervals.b_frame_interval_type(),
        )?;
        for interval in self.frame_intervals.values() {
            buffer.write_u32::<LittleEndian>(interval)?;
        }
        Ok(())
    }
    pub fn size(&self) -> usize {
        let format = structure!("<BBBBBHHIIIIB");
        format.size() + self.frame_intervals.values().len() * std::mem::size_of::<u32>()
    }
}

/// 3.9.2.6 Color Matching Descriptor, 0 means "not specified" for every field.
#[derive(Debug, Clone, Copy)]
pub struct UvcColorMatchingDescriptor {
    pub b_color_primaries: u8,
    pub b_transfer_characteristics: u8,
    pub b_matrix_coefficients: u8,
}

impl UvcColorMatchingDescriptor {
    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<BBBBBB");
        format.pack_into(&mut buffer, format.size() as u8, UsbDescriptorTypes::CsInterface as u8, UvcVsDescriptorSubtypes::ColorFormat as u8,
                         self.b_color_primaries, self.b_transfer_characteristics, self.b_matrix_coefficients,
        )?;
        Ok(())
    }
}

/// Video probe and commit controls (4.3.1.1), laid out exactly as the host parses them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UvcStreamingControl {
    pub bm_hint: u16,
    pub b_format_index: u8,
    pub b_frame_index: u8,
    pub dw_frame_interval: u32,
    pub w_key_frame_rate: u16,
    pub w_pframe_rate: u16,
    pub w_comp_quality: u16,
    pub w_comp_window_size: u16,
    pub w_delay: u16,
    pub dw_max_video_frame_size: u32,
    pub dw_max_payload_transfer_size: u32,
    pub dw_clock_frequency: u32,
    pub bm_framing_info: u8,
    pub b_prefered_version: u8,
    pub b_min_version: u8,
    pub b_max_version: u8,
}

impl UvcStreamingControl {
    pub fn deserialize(mut buffer: &mut &[u8]) -> Result<UvcStreamingControl, Error> {
        let format = structure!("<HBBIHHHHHIIIBBBB");
        let (bm_hint, b_format_index, b_frame_index, dw_frame_interval, w_key_frame_rate, w_pframe_rate, w_comp_quality, w_comp_window_size, w_delay, dw_max_video_frame_size,
            dw_max_payload_transfer_size, dw_clock_frequency, bm_framing_info, b_prefered_version, b_min_version, b_max_version) = format.unpack_from(&mut buffer)?;
        let msg = UvcStreamingControl {
            bm_hint,
            b_format_index,
            b_frame_index,
            dw_frame_interval,
            w_key_frame_rate,
            w_pframe_rate,
            w_comp_quality,
            w_comp_window_size,
            w_delay,
            dw_max_video_frame_size,
            dw_max_payload_transfer_size,
            dw_clock_frequency,
            bm_framing_info,
            b_prefered_version,
            b_min_version,
            b_max_version,
        };
        Ok(msg)
    }

    pub fn serialize(&self, mut buffer: impl Write) -> Result<(), Error> {
        let format = structure!("<HBBIHHHHHIIIBBBB");
        format.pack_into(&mut buffer, self.bm_hint, self.b_format_index, self.b_frame_index, self.dw_frame_interval, self.w_key_frame_rate, self.w_pframe_rate,
                         self.w_comp_quality, self.w_comp_window_size, self.w_delay, self.dw_max_video_frame_size, self.dw_max_payload_transfer_size,
                         self.dw_clock_frequency, self.bm_framing_info, self.b_prefered_version, self.b_min_version, self.b_max_version,
        )?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::with_capacity(STREAMING_CONTROL_SIZE);
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Overwrites the leading wire bytes of the block with `data`, leaving the tail untouched.
    /// Returns how many bytes were taken.
    pub fn write_prefix(&mut self, data: &[u8]) -> Result<usize, Error> {
        let mut bytes = self.to_bytes()?;
        let len = data.len().min(bytes.len());
        bytes[..len].copy_from_slice(&data[..len]);
        *self = UvcStreamingControl::deserialize(&mut &bytes[..])?;
        Ok(len)
    }

    pub fn frame_rate(&self) -> f32 {
        if self.dw_frame_interval == 0 {
            return 0.0;
        }
        10_000_000.0 / self.dw_frame_interval as f32
    }
}

#[cfg(test)]
mod tests {
    use float_eq::float_eq;

    use super::*;

    fn sample_control() -> UvcStreamingControl {
        UvcStreamingControl {
            bm_hint: 0x0001,
            b_format_index: 1,
            b_frame_index: 1,
            dw_frame_interval: 333333,
            dw_max_video_frame_size: 614400,
            dw_max_payload_transfer_size: 512,
            dw_clock_frequency: 48_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn streaming_control_is_34_bytes() {
        let bytes = sample_control().to_bytes().unwrap();
        assert_eq!(bytes.len(), STREAMING_CONTROL_SIZE);
    }

    #[test]
    fn streaming_control_field_offsets() {
        let bytes = sample_control().to_bytes().unwrap();
        assert_eq!(&bytes[0..2], &[0x01, 0x00]); // bmHint
        assert_eq!(bytes[2], 1); // bFormatIndex
        assert_eq!(bytes[3], 1); // bFrameIndex
        assert_eq!(&bytes[4..8], &333333u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &614400u32.to_le_bytes());
        assert_eq!(&bytes[22..26], &512u32.to_le_bytes());
        assert_eq!(&bytes[26..30], &48_000_000u32.to_le_bytes());
        assert_eq!(&bytes[30..34], &[0, 0, 0, 0]);
    }

    #[test]
    fn streaming_control_parses_host_bytes() {
        let mut bytes = vec![0u8; STREAMING_CONTROL_SIZE];
        bytes[2] = 1;
        bytes[3] = 1;
        bytes[4..8].copy_from_slice(&666666u32.to_le_bytes());
        bytes[31] = 1;
        let ctrl = UvcStreamingControl::deserialize(&mut &bytes[..]).unwrap();
        assert_eq!(ctrl.dw_frame_interval, 666666);
        assert_eq!(ctrl.b_prefered_version, 1);
        assert_eq!(ctrl.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn streaming_control_rejects_short_input() {
        let bytes = [0u8; 26];
        assert!(UvcStreamingControl::deserialize(&mut &bytes[..]).is_err());
    }

    #[test]
    fn write_prefix_keeps_tail() {
        // a UVC 1.0 host only sends the first 26 bytes
        let mut ctrl = sample_control();
        let mut update = vec![0u8; 26];
        update[4..8].copy_from_slice(&666666u32.to_le_bytes());
        let written = ctrl.write_prefix(&update).unwrap();

        assert_eq!(written, 26);
        assert_eq!(ctrl.dw_frame_interval, 666666);
        assert_eq!(ctrl.b_format_index, 0);
        assert_eq!(ctrl.dw_clock_frequency, 48_000_000);
    }

    #[test]
    fn write_prefix_truncates_oversized_input() {
        let mut ctrl = sample_control();
        let written = ctrl.write_prefix(&[0xffu8; 64]).unwrap();
        assert_eq!(written, STREAMING_CONTROL_SIZE);
        assert_eq!(ctrl.b_max_version, 0xff);
    }

    #[test]
    fn frame_rate_from_interval() {
        let ctrl = sample_control();
        assert!(float_eq!(ctrl.frame_rate(), 30.0, abs <= 0.001));

        let ctrl = UvcStreamingControl { dw_frame_interval: 10_000_000 / 24, ..sample_control() };
        assert!(float_eq!(ctrl.frame_rate(), 24.0, abs <= 0.001));

        let ctrl = UvcStreamingControl::default();
        assert!(float_eq!(ctrl.frame_rate(), 0.0, abs <= 0.000_1));
    }

    #[test]
    fn selector_w_value() {
        assert_eq!(VsControlSelector::ProbeControl.w_value(), 256);
        assert_eq!(VsControlSelector::CommitControl.w_value(), 512);
    }

    #[test]
    fn frame_mjpeg_continuous_size() {
        let frame = DescriptorUvcFrameMjpeg {
            b_frame_index: 1,
            bm_capabilities: 0,
            w_width: 640,
            w_height: 480,
            dw_min_bit_rate: 0x7CE000,
            dw_max_bit_rate: 0x3E80000,
            dw_max_video_frame_buffer_size: 614400,
            dw_default_frame_interval: 416666,
            frame_intervals: FrameIntervals::Continuous { min: 416666, max: 416666, step: 0 },
        };
        let mut out = vec![];
        frame.serialize(&mut out).unwrap();
        assert_eq!(out.len(), 0x26);
        assert_eq!(out[0] as usize, out.len());
        assert_eq!(out[25], 0); // bFrameIntervalType
    }

    #[test]
    fn frame_mjpeg_discrete_size() {
        let frame = DescriptorUvcFrameMjpeg {
            b_frame_index: 2,
            bm_capabilities: 0,
            w_width: 1280,
            w_height: 720,
            dw_min_bit_rate: 0,
            dw_max_bit_rate: 0,
            dw_max_video_frame_buffer_size: 0,
            dw_default_frame_interval: 333333,
            frame_intervals: FrameIntervals::Discrete(vec![333333, 666666]),
        };
        let mut out = vec![];
        frame.serialize(&mut out).unwrap();
        assert_eq!(out.len(), 26 + 8);
        assert_eq!(out[25], 2);
    }

    #[test]
    fn camera_terminal_layout() {
        let it = UvcCameraTerminalDescriptor {
            b_terminal_id: 1,
            b_assoc_terminal: 0,
            i_terminal: 0,
            w_objective_focal_length_min: 0,
            w_objective_focal_length_max: 0,
            w_ocular_focal_length: 0,
            bm_controls: vec![0, 0],
        };
        let mut out = vec![];
        it.serialize(&mut out).unwrap();
        assert_eq!(out, vec![17, 0x24, 0x02, 0x01, 0x01, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0x02, 0, 0]);
    }
}
