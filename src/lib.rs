//! Device side of a USB Video Class function: descriptor tables, probe/commit negotiation and
//! the alternate setting lifecycle, driven by a device controller core through [`UsbClass`].

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate num_derive;
#[macro_use]
extern crate structure;

pub mod usb_proto;
pub mod uvc_proto;
pub mod config;
pub mod descriptor;
pub mod transport;
pub mod hardware;
pub mod class;
pub mod logger;

pub use class::{ControlState, StreamingTarget, UsbClass, UvcDevice};
pub use config::{TransferMode, VideoCapabilities};
pub use descriptor::{build_configuration_descriptor, build_device_qualifier_descriptor};
pub use hardware::{NullVideoInterface, VideoInterface};
pub use transport::{EndpointType, UsbTransport};
pub use usb_proto::SetupPacket;
pub use uvc_proto::UvcStreamingControl;
