use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("hx711 data-ready timeout")]
    DataReadyTimeout,
    #[error("load cell read while powered down")]
    PoweredDown,
    #[error("store range out of bounds: {addr}+{len} > {capacity}")]
    OutOfBounds {
        addr: usize,
        len: usize,
        capacity: usize,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
