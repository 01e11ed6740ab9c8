use anyhow::Error;

/// Board side of the video function. Every hook defaults to doing nothing.
pub trait VideoInterface {
    fn init(&mut self, _clock_frequency: u32, _volume: u32, _options: u32) -> Result<(), Error> {
        Ok(())
    }

    fn deinit(&mut self, _options: u32) -> Result<(), Error> {
        Ok(())
    }

    fn command(&mut self, _buf: &mut [u8], _cmd: u8) -> Result<(), Error> {
        Ok(())
    }

    fn volume(&mut self, _volume: u8) -> Result<(), Error> {
        Ok(())
    }

    fn mute(&mut self, _mute: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Called once per completed transfer on the data endpoint.
    fn periodic_tick(&mut self, _buf: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    fn state(&mut self) -> Result<u8, Error> {
        Ok(0)
    }
}

/// Template implementation for boards with nothing to drive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVideoInterface;

impl VideoInterface for NullVideoInterface {}
