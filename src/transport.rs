//! Serial transport towards the module
use fugit::MillisDurationU32;

/// Direction of a transport flush
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlushDirection {
    Receive,
    Transmit,
    Both,
}

/// Read mode of a transaction. Only blocking reads are supported.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadMode {
    Blocking,
    Asynchronous,
}

/// Byte level serial transport, e.g. a UART
pub trait Transport: embedded_io::ErrorType {
    /// Writes all given bytes
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads up to `buffer.len()` bytes, blocking until the buffer is full or the timeout elapsed.
    /// Returns the number of bytes read, a timeout is not an error.
    fn read(&mut self, buffer: &mut [u8], timeout: MillisDurationU32) -> Result<usize, Self::Error>;

    /// Discards pending data in the given direction
    fn flush(&mut self, direction: FlushDirection) -> Result<(), Self::Error>;
}
