//! # Transaction engine
//!
//! Owns the transport together with the transmit and receive buffers. Every transaction takes
//! `&mut self`, so a command and its response can never interleave with another exchange.
use crate::buffer::ByteBuffer;
use crate::commands::{encode_command, AtCommand};
use crate::config::DebugLevel;
use crate::responses::ResponseOutcome;
use crate::transport::{FlushDirection, ReadMode, Transport};
use crate::wifi::Error;
use alloc::string::String;
use fugit::MillisDurationU32;

/// Command/response session
///
/// RX_SIZE: Chunk size in bytes of a single transport read. Responses longer than the chunk size
/// are accumulated over multiple reads.
pub struct Session<T: Transport, const RX_SIZE: usize> {
    /// Serial transport
    pub(crate) transport: T,

    /// Encoded command frame
    tx: ByteBuffer,

    /// Parameter scratch buffer
    params: ByteBuffer,

    /// Accumulated response of the last transaction
    rx: ByteBuffer,

    pub(crate) debug_level: DebugLevel,
}

impl<T: Transport, const RX_SIZE: usize> Session<T, RX_SIZE> {
    pub fn new(transport: T, debug_level: DebugLevel) -> Self {
        Self {
            transport,
            tx: ByteBuffer::new(),
            params: ByteBuffer::new(),
            rx: ByteBuffer::new(),
            debug_level,
        }
    }

    /// Encodes and writes the given command
    pub fn send_command<C: AtCommand + ?Sized>(&mut self, command: &C) -> Result<(), Error> {
        encode_command(command, &mut self.params, &mut self.tx)?;

        if self.debug_level >= DebugLevel::Low {
            log::debug!("Command: {}", String::from_utf8_lossy(self.frame_text()));
        }

        if self.debug_level >= DebugLevel::High {
            log::trace!("SW {:02x?}", self.tx.as_slice());
        }

        self.transport.write(self.tx.as_slice()).map_err(|error| {
            log::warn!("Writing command failed: {:?}", error);
            Error::WriteFailed
        })
    }

    /// Writes raw payload data
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.debug_level >= DebugLevel::High {
            log::trace!("SW {:02x?}", data);
        }

        self.transport.write(data).map_err(|error| {
            log::warn!("Writing data failed: {:?}", error);
            Error::WriteFailed
        })?;

        Ok(data.len())
    }

    /// Reads up to `length` bytes and appends them to the receive buffer
    pub fn read(&mut self, timeout: MillisDurationU32, length: usize, mode: ReadMode) -> Result<usize, Error> {
        if mode == ReadMode::Asynchronous {
            return Err(Error::AsynchronousUnsupported);
        }

        let start = self.rx.append_extra(length)?;
        let result = self.transport.read(&mut self.rx.as_mut_slice()[start..], timeout);

        let count = match result {
            Ok(count) => count.min(length),
            Err(error) => {
                log::warn!("Reading from transport failed: {:?}", error);
                0
            }
        };

        self.rx.truncate(start + count);
        Ok(count)
    }

    /// Accumulates a response and searches it for `token`
    ///
    /// With `read_length` set, exactly one read of the given length is done. Otherwise the
    /// transport is read in chunks of RX_SIZE until it is drained.
    pub fn read_for_response(
        &mut self,
        token: &[u8],
        timeout: MillisDurationU32,
        read_length: Option<usize>,
    ) -> Result<ResponseOutcome, Error> {
        self.accumulate(timeout, read_length)?;
        Ok(ResponseOutcome::classify(self.rx.as_slice(), token, None))
    }

    /// Accumulates a response and searches it for the `pass` or else the `fail` token
    pub fn read_for_responses(
        &mut self,
        pass: &[u8],
        fail: &[u8],
        timeout: MillisDurationU32,
    ) -> Result<ResponseOutcome, Error> {
        self.accumulate(timeout, None)?;
        Ok(ResponseOutcome::classify(self.rx.as_slice(), pass, Some(fail)))
    }

    /// Sends a command and waits for the given token
    pub fn transact<C: AtCommand + ?Sized>(
        &mut self,
        command: &C,
        token: &[u8],
        timeout: MillisDurationU32,
    ) -> Result<usize, Error> {
        self.send_command(command)?;
        self.read_for_response(token, timeout, None)?.into_result()
    }

    /// Sends a command and waits for the pass or fail token
    pub fn transact_dual<C: AtCommand + ?Sized>(
        &mut self,
        command: &C,
        pass: &[u8],
        fail: &[u8],
        timeout: MillisDurationU32,
    ) -> Result<ResponseOutcome, Error> {
        self.send_command(command)?;
        self.read_for_responses(pass, fail, timeout)
    }

    /// Accumulated response of the last transaction
    pub fn response(&self) -> &[u8] {
        self.rx.as_slice()
    }

    /// True if the last response contains `needle`
    pub fn response_contains(&self, needle: &[u8]) -> bool {
        self.rx.find(needle).is_some()
    }

    /// Flushes the transport and clears the receive buffer
    pub fn flush(&mut self, direction: FlushDirection) -> Result<(), Error> {
        self.clear_buffer();
        self.transport.flush(direction).map_err(|error| {
            log::warn!("Flushing transport failed: {:?}", error);
            Error::WriteFailed
        })
    }

    pub fn clear_buffer(&mut self) {
        self.rx.clear();
    }

    pub fn set_debug_level(&mut self, level: DebugLevel) {
        self.debug_level = level;
    }

    fn accumulate(&mut self, timeout: MillisDurationU32, read_length: Option<usize>) -> Result<usize, Error> {
        self.clear_buffer();

        let chunk = read_length.unwrap_or(RX_SIZE);
        let mut total = 0;

        loop {
            let count = self.read(timeout, chunk, ReadMode::Blocking)?;
            total += count;

            if read_length.is_some() || count == 0 || count < chunk {
                break;
            }
        }

        if total > 0 {
            self.log_response();
        }

        Ok(total)
    }

    fn log_response(&self) {
        if self.debug_level >= DebugLevel::Low {
            log::debug!("Response: {}", String::from_utf8_lossy(self.rx.as_slice()));
        }

        if self.debug_level >= DebugLevel::High {
            log::trace!("SR {:02x?}", self.rx.as_slice());
        }
    }

    /// Command frame without line terminator
    fn frame_text(&self) -> &[u8] {
        let frame = self.tx.as_slice();
        frame.strip_suffix(b"\r\n").unwrap_or(frame)
    }
}
