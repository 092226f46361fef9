use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("channel {0} out of range")]
    ChannelOutOfRange(usize),
    #[error("temperature sensor timeout")]
    SensorTimeout,
}
