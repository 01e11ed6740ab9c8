use anyhow::{Context, Error};
use num_traits::FromPrimitive;

use crate::config::VideoCapabilities;
use crate::descriptor::{build_configuration_descriptor, build_device_qualifier_descriptor, declared_config_size, ALT_SETTING_STREAMING, CLASS_DESCRIPTOR_OFFSET, VIDEO_TOTAL_IF_NUM};
use crate::hardware::VideoInterface;
use crate::transport::UsbTransport;
use crate::usb_proto::{ep_in, SetupPacket, StdRequest, UsbDescriptorTypes, XferType, EP0_OUT};
use crate::uvc_proto::{UvcRequestCodes, UvcStreamingControl, VsControlSelector, STREAMING_CONTROL_SIZE};

/// Class driver callbacks, invoked one at a time by the device controller core.
pub trait UsbClass {
    fn attach(&mut self, transport: &mut dyn UsbTransport, cfgidx: u8) -> Result<(), Error>;
    fn detach(&mut self, transport: &mut dyn UsbTransport, cfgidx: u8) -> Result<(), Error>;
    fn setup(&mut self, transport: &mut dyn UsbTransport, req: &SetupPacket) -> Result<(), Error>;
    fn ep0_tx_ready(&mut self, transport: &mut dyn UsbTransport) -> Result<(), Error>;
    /// Completion of a control OUT data stage, `data` holds what the host sent.
    fn ep0_rx_ready(&mut self, transport: &mut dyn UsbTransport, data: &[u8]) -> Result<(), Error>;
    fn data_in(&mut self, transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error>;
    fn data_out(&mut self, transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error>;
    fn sof(&mut self, transport: &mut dyn UsbTransport) -> Result<(), Error>;
    fn iso_in_incomplete(&mut self, transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error>;
    fn iso_out_incomplete(&mut self, transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error>;
    fn get_hs_cfg_desc(&self) -> &[u8];
    fn get_fs_cfg_desc(&self) -> &[u8];
    fn get_other_speed_cfg_desc(&self) -> &[u8];
    fn get_device_qualifier_desc(&self) -> &[u8];
}

/// Which streaming control block a request addresses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamingTarget {
    Probe,
    Commit,
}

impl StreamingTarget {
    /// Anything that is not the probe selector lands on commit.
    pub fn from_w_value(w_value: u16) -> StreamingTarget {
        match w_value {
            w if w == VsControlSelector::ProbeControl.w_value() => StreamingTarget::Probe,
            w if w == VsControlSelector::CommitControl.w_value() => StreamingTarget::Commit,
            _ => StreamingTarget::Commit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlState {
    Idle,
    AwaitingDataStage { target: StreamingTarget, len: u16 },
}

pub fn initial_streaming_control(caps: &VideoCapabilities) -> UvcStreamingControl {
    UvcStreamingControl {
        bm_hint: 0,
        b_format_index: 1,
        b_frame_index: 1,
        dw_frame_interval: caps.default_frame_interval,
        dw_max_video_frame_size: caps.max_frame_size,
        dw_max_payload_transfer_size: caps.packet_size as u32,
        dw_clock_frequency: caps.clock_frequency,
        ..Default::default()
    }
}

pub struct UvcDevice<H: VideoInterface> {
    caps: VideoCapabilities,
    cfg_desc: Vec<u8>,
    dq_desc: Vec<u8>,
    probe: UvcStreamingControl,
    commit: UvcStreamingControl,
    alt_setting: u8,
    state: ControlState,
    hw: H,
}

impl<H: VideoInterface> UvcDevice<H> {
    pub fn new(caps: VideoCapabilities, hw: H) -> Result<UvcDevice<H>, Error> {
        let cfg_desc = build_configuration_descriptor(&caps)?;
        let dq_desc = build_device_qualifier_descriptor()?;
        Ok(UvcDevice {
            caps,
            cfg_desc,
            dq_desc,
            probe: initial_streaming_control(&caps),
            commit: initial_streaming_control(&caps),
            alt_setting: 0,
            state: ControlState::Idle,
            hw,
        })
    }

    pub fn capabilities(&self) -> &VideoCapabilities {
        &self.caps
    }

    pub fn probe(&self) -> &UvcStreamingControl {
        &self.probe
    }

    pub fn commit(&self) -> &UvcStreamingControl {
        &self.commit
    }

    pub fn alt_setting(&self) -> u8 {
        self.alt_setting
    }

    pub fn control_state(&self) -> ControlState {
        self.state
    }

    fn data_ep(&self) -> u8 {
        ep_in(self.caps.data_ep_num)
    }

    fn block(&self, target: StreamingTarget) -> &UvcStreamingControl {
        match target {
            StreamingTarget::Probe => &self.probe,
            StreamingTarget::Commit => &self.commit,
        }
    }

    fn block_mut(&mut self, target: StreamingTarget) -> &mut UvcStreamingControl {
        match target {
            StreamingTarget::Probe => &mut self.probe,
            StreamingTarget::Commit => &mut self.commit,
        }
    }

    fn class_request(&mut self, transport: &mut dyn UsbTransport, req: &SetupPacket) -> Result<(), Error> {
        let target = StreamingTarget::from_w_value(req.w_value);
        match UvcRequestCodes::from_u8(req.b_request) {
            // min/max/def are not tracked separately, every read reports the current block
            Some(code @ (UvcRequestCodes::GetCur | UvcRequestCodes::GetDef | UvcRequestCodes::GetMin | UvcRequestCodes::GetMax)) => {
                debug!("{:?} {:?} len {}", code, target, req.w_length);
                transport.flush_ep(EP0_OUT)?;
                let bytes = self.block(target).to_bytes()?;
                let len = (req.w_length as usize).min(bytes.len());
                transport.ctl_send_data(&bytes[..len])?;
            }
            Some(UvcRequestCodes::SetCur) => {
                debug!("SetCur {:?} len {}", target, req.w_length);
                if req.w_length > 0 {
                    transport.ctl_prepare_rx(req.w_length)?;
                    self.state = ControlState::AwaitingDataStage { target, len: req.w_length };
                }
            }
            _ => {
                warn!("stalling unsupported class request {:#04x}", req.b_request);
                transport.ctl_error();
                return Err(anyhow!("unsupported class request {:#04x}", req.b_request));
            }
        }
        Ok(())
    }

    fn std_request(&mut self, transport: &mut dyn UsbTransport, req: &SetupPacket) -> Result<(), Error> {
        match StdRequest::from_u8(req.b_request) {
            Some(StdRequest::GetDescriptor) => {
                if req.value_hi() == UsbDescriptorTypes::CsDevice as u8 {
                    let start = CLASS_DESCRIPTOR_OFFSET.min(self.cfg_desc.len());
                    let len = (declared_config_size(self.caps.transfer_mode) as usize)
                        .min(req.w_length as usize)
                        .min(self.cfg_desc.len() - start);
                    debug!("class descriptor len {}", len);
                    transport.ctl_send_data(&self.cfg_desc[start..start + len])?;
                } else {
                    debug!("descriptor type {:#04x} left to the core", req.value_hi());
                }
            }
            Some(StdRequest::GetInterface) => {
                debug!("GetInterface -> {}", self.alt_setting);
                transport.ctl_send_data(&[self.alt_setting])?;
            }
            Some(StdRequest::SetInterface) => {
                let alt = req.value_lo();
                if alt < VIDEO_TOTAL_IF_NUM {
                    self.alt_setting = alt;
                    if alt == ALT_SETTING_STREAMING {
                        info!("EP enabled");
                    } else {
                        info!("EP disabled");
                        transport.flush_ep(self.data_ep())?;
                    }
                } else {
                    warn!("stalling SetInterface to alternate setting {}", alt);
                    transport.ctl_error();
                    return Err(anyhow!("alternate setting {} out of range", alt));
                }
            }
            _ => {
                debug!("standard request {:#04x} not handled", req.b_request);
            }
        }
        Ok(())
    }
}

impl<H: VideoInterface> UsbClass for UvcDevice<H> {
    fn attach(&mut self, transport: &mut dyn UsbTransport, cfgidx: u8) -> Result<(), Error> {
        info!("attach cfg {} {:?}", cfgidx, self.caps.transfer_mode);
        self.alt_setting = 0;
        self.state = ControlState::Idle;

        self.hw.init(self.caps.clock_frequency, 0, 0).context("video hardware init failed")?;

        let ep = self.data_ep();
        transport.open_ep(ep, self.caps.transfer_mode.ep_transfer_type().into(), self.caps.packet_size)?;
        transport.flush_ep(ep)?;
        Ok(())
    }

    fn detach(&mut self, transport: &mut dyn UsbTransport, cfgidx: u8) -> Result<(), Error> {
        info!("detach cfg {}", cfgidx);
        transport.close_ep(self.data_ep())?;
        self.hw.deinit(0).context("video hardware deinit failed")?;
        Ok(())
    }

    fn setup(&mut self, transport: &mut dyn UsbTransport, req: &SetupPacket) -> Result<(), Error> {
        debug!("{}", req);
        // a new setup cancels any data stage still pending
        if let ControlState::AwaitingDataStage { target, .. } = self.state {
            warn!("dropping armed {:?} data stage", target);
            self.state = ControlState::Idle;
        }
        match req.xfer_type() {
            XferType::Class => self.class_request(transport, req),
            XferType::Std => self.std_request(transport, req),
            _ => Ok(()),
        }
    }

    fn ep0_tx_ready(&mut self, _transport: &mut dyn UsbTransport) -> Result<(), Error> {
        trace!("ep0 tx ready");
        Ok(())
    }

    fn ep0_rx_ready(&mut self, _transport: &mut dyn UsbTransport, data: &[u8]) -> Result<(), Error> {
        match self.state {
            ControlState::AwaitingDataStage { target, len } => {
                self.state = ControlState::Idle;
                let n = data.len().min(len as usize);
                let written = self.block_mut(target).write_prefix(&data[..n])?;
                debug!("{:?} updated with {} bytes: {:?}", target, written, self.block(target));
            }
            ControlState::Idle => {
                warn!("ignoring {} byte data stage with nothing armed", data.len());
            }
        }
        Ok(())
    }

    fn data_in(&mut self, _transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error> {
        trace!("data in ep {:#04x}", ep_num);
        Ok(())
    }

    fn data_out(&mut self, _transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error> {
        trace!("data out ep {:#04x}", ep_num);
        Ok(())
    }

    fn sof(&mut self, _transport: &mut dyn UsbTransport) -> Result<(), Error> {
        Ok(())
    }

    fn iso_in_incomplete(&mut self, _transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error> {
        trace!("iso in incomplete ep {:#04x}", ep_num);
        Ok(())
    }

    fn iso_out_incomplete(&mut self, _transport: &mut dyn UsbTransport, ep_num: u8) -> Result<(), Error> {
        trace!("iso out incomplete ep {:#04x}", ep_num);
        Ok(())
    }

    fn get_hs_cfg_desc(&self) -> &[u8] {
        &self.cfg_desc
    }

    fn get_fs_cfg_desc(&self) -> &[u8] {
        &self.cfg_desc
    }

    fn get_other_speed_cfg_desc(&self) -> &[u8] {
        &self.cfg_desc
    }

    fn get_device_qualifier_desc(&self) -> &[u8] {
        &self.dq_desc
    }
}
