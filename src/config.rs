use crate::usb_proto::EndpointAttrTransferType;

/// How video payloads travel to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferMode {
    /// Isochronous endpoint in alternate setting 1, alternate setting 0 has no bandwidth.
    Isochronous,
    /// Bulk endpoint in alternate setting 0.
    Bulk,
}

impl TransferMode {
    #[cfg(not(feature = "bulk"))]
    pub const DEFAULT: TransferMode = TransferMode::Isochronous;
    #[cfg(feature = "bulk")]
    pub const DEFAULT: TransferMode = TransferMode::Bulk;

    pub fn ep_transfer_type(&self) -> EndpointAttrTransferType {
        match self {
            TransferMode::Isochronous => EndpointAttrTransferType::Isochronous,
            TransferMode::Bulk => EndpointAttrTransferType::Bulk,
        }
    }
}

impl Default for TransferMode {
    fn default() -> Self {
        TransferMode::DEFAULT
    }
}

pub const fn fps_to_interval(fps: u32) -> u32 {
    10_000_000 / fps
}

/// Everything the descriptors advertise and the streaming controls start from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoCapabilities {
    pub width: u16,
    pub height: u16,
    /// 100ns units
    pub default_frame_interval: u32,
    pub min_frame_interval: u32,
    pub max_frame_interval: u32,
    pub min_bit_rate: u32,
    pub max_bit_rate: u32,
    pub max_frame_size: u32,
    pub packet_size: u16,
    pub clock_frequency: u32,
    pub max_power_ma: u16,
    pub data_ep_num: u8,
    pub transfer_mode: TransferMode,
}

const WIDTH: u16 = 640;
const HEIGHT: u16 = 480;
const CAM_FPS: u32 = 24;

impl VideoCapabilities {
    pub const DEFAULT: VideoCapabilities = VideoCapabilities {
        width: WIDTH,
        height: HEIGHT,
        default_frame_interval: fps_to_interval(CAM_FPS),
        // the frame descriptor pins the range to the default interval
        min_frame_interval: fps_to_interval(CAM_FPS),
        max_frame_interval: fps_to_interval(CAM_FPS),
        min_bit_rate: 0x7CE000,
        max_bit_rate: 0x3E80000,
        max_frame_size: WIDTH as u32 * HEIGHT as u32 * 2,
        packet_size: 512,
        clock_frequency: 48_000_000,
        max_power_ma: 500,
        data_ep_num: 0x01,
        transfer_mode: TransferMode::DEFAULT,
    };

    pub fn with_transfer_mode(self, transfer_mode: TransferMode) -> VideoCapabilities {
        VideoCapabilities { transfer_mode, ..self }
    }
}

impl Default for VideoCapabilities {
    fn default() -> Self {
        VideoCapabilities::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities() {
        let caps = VideoCapabilities::default();
        assert_eq!(caps.default_frame_interval, 416666);
        assert_eq!(caps.max_frame_size, 614400);
        assert_eq!(caps.packet_size, 512);
    }

    #[cfg(not(feature = "bulk"))]
    #[test]
    fn default_transfer_mode_is_isochronous() {
        assert_eq!(TransferMode::default(), TransferMode::Isochronous);
    }

    #[test]
    fn transfer_mode_override() {
        let caps = VideoCapabilities::DEFAULT.with_transfer_mode(TransferMode::Bulk);
        assert_eq!(caps.transfer_mode, TransferMode::Bulk);
        assert_eq!(caps.transfer_mode.ep_transfer_type(), EndpointAttrTransferType::Bulk);
        assert_eq!(caps.width, VideoCapabilities::DEFAULT.width);
    }
}
