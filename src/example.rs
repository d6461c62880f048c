//! Mocks for doc examples
use crate::transport::{FlushDirection, Transport};
use alloc::collections::VecDeque;
use core::convert::Infallible;
use fugit::{MillisDurationU32, TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use numtoa::NumToA;

/// Transport mock answering every command frame with a canned response
#[derive(Default)]
pub struct ExampleTransport {
    /// Bytes waiting to be read
    pending: VecDeque<u8>,
}

impl ExampleTransport {
    fn respond(&mut self, response: &[u8]) {
        self.pending.extend(response);
    }

    /// Confirms a raw payload write
    fn confirm_payload(&mut self, length: usize) {
        let mut digits = [0u8; 20];

        self.respond(b"\r\nRecv ");
        self.respond(length.numtoa(10, &mut digits));
        self.respond(b" bytes\r\n\r\nSEND OK\r\n");
    }
}

impl embedded_io::ErrorType for ExampleTransport {
    type Error = Infallible;
}

impl Transport for ExampleTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        match data {
            b"AT+RST\r\n" => self.respond(b"\r\nOK\r\n ets Jan  8 2013,rst cause:2\r\n\r\nready\r\n"),
            b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n" => {
                self.respond(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");
            }
            b"AT+CWQAP\r\n" => self.respond(b"\r\nOK\r\nWIFI DISCONNECT\r\n"),
            b"AT+CIFSR\r\n" => {
                self.respond(b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n");
            }
            b"AT+CIPSTAMAC?\r\n" => self.respond(b"+CIPSTAMAC:\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n"),
            b"AT+CIPSTATUS\r\n" => self.respond(b"STATUS:2\r\n\r\nOK\r\n"),
            b"AT+CIPSTART=0,\"TCP\",\"10.0.0.1\",21\r\n" => self.respond(b"0,CONNECT\r\n\r\nOK\r\n"),
            b"AT+CIPCLOSE=0\r\n" => self.respond(b"0,CLOSED\r\n\r\nOK\r\n"),
            frame if frame.starts_with(b"AT+CIPSEND=") => self.respond(b"\r\nOK\r\n> "),
            frame if frame.starts_with(b"AT") => self.respond(b"\r\nOK\r\n"),
            payload => self.confirm_payload(payload.len()),
        }

        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8], _timeout: MillisDurationU32) -> Result<usize, Self::Error> {
        let count = buffer.len().min(self.pending.len());

        for (target, byte) in buffer.iter_mut().zip(self.pending.drain(..count)) {
            *target = byte;
        }

        Ok(count)
    }

    fn flush(&mut self, direction: FlushDirection) -> Result<(), Self::Error> {
        if direction != FlushDirection::Transmit {
            self.pending.clear();
        }

        Ok(())
    }
}

/// Timer mock, every delay elapses immediately
#[derive(Default)]
pub struct ExampleTimer {}

impl Timer<1_000_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        TimerInstantU32::from_ticks(0)
    }

    fn start(&mut self, _duration: TimerDurationU32<1000000>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}
