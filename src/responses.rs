//! Response classification and field extraction
use crate::buffer::find;
use crate::wifi::Error;
use core::net::Ipv4Addr;
use heapless::String;

/// Terminal tokens
pub(crate) const RESPONSE_OK: &[u8] = b"OK";
pub(crate) const RESPONSE_ERROR: &[u8] = b"ERROR";
pub(crate) const RESPONSE_FAIL: &[u8] = b"FAIL";
pub(crate) const RESPONSE_READY: &[u8] = b"ready";
pub(crate) const RESPONSE_SEND_OK: &[u8] = b"SEND OK";
pub(crate) const WIFI_DISCONNECT: &[u8] = b"WIFI DISCONNECT";

/// Field markers
pub(crate) const MARKER_ALREADY: &[u8] = b"ALREADY";
pub(crate) const MARKER_NO_AP: &[u8] = b"No AP";
pub(crate) const MARKER_ACCESS_POINT: &[u8] = b"+CWJAP:\"";
pub(crate) const MARKER_STATION_IP: &[u8] = b"+CIFSR:STAIP,\"";
pub(crate) const MARKER_MAC: &[u8] = b"+CIPSTAMAC:\"";
pub(crate) const MARKER_PING_TIMEOUT: &[u8] = b"timeout";
pub(crate) const MARKER_AT_VERSION: &[u8] = b"AT version:";
pub(crate) const MARKER_SDK_VERSION: &[u8] = b"SDK version:";
pub(crate) const MARKER_COMPILE_TIME: &[u8] = b"compile time:";

/// Result of a single command/response transaction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Expected token found, carries the number of bytes read
    Success(usize),
    /// Bytes were read but the expected token is missing
    Unknown,
    /// Nothing was read before the deadline
    Timeout,
    /// The fail token was found
    ProtocolFail,
    /// Request rejected before any I/O
    BadRequest,
}

impl ResponseOutcome {
    /// Classifies the accumulated response. `fail` is only checked if `pass` is missing.
    pub fn classify(response: &[u8], pass: &[u8], fail: Option<&[u8]>) -> Self {
        if find(response, pass).is_some() {
            return Self::Success(response.len());
        }

        if let Some(fail) = fail {
            if find(response, fail).is_some() {
                return Self::ProtocolFail;
            }
        }

        if response.is_empty() {
            Self::Timeout
        } else {
            Self::Unknown
        }
    }

    /// Signed result code: byte count on success, negative failure kinds otherwise
    pub fn code(&self) -> i32 {
        match self {
            Self::Success(count) => *count as i32,
            Self::Timeout => -1,
            Self::Unknown => -2,
            Self::ProtocolFail => -3,
            Self::BadRequest => -5,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure kind, None on success
    pub fn error(&self) -> Option<Error> {
        match self {
            Self::Success(_) => None,
            Self::Unknown => Some(Error::Unknown),
            Self::Timeout => Some(Error::Timeout),
            Self::ProtocolFail => Some(Error::ProtocolFail),
            Self::BadRequest => Some(Error::BadRequest),
        }
    }

    pub fn into_result(self) -> Result<usize, Error> {
        match self {
            Self::Success(count) => Ok(count),
            failure => Err(failure.error().unwrap_or(Error::Unknown)),
        }
    }
}

/// Result of a TCP connect
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection was established
    Connected,
    /// Module rejected the request since the link was already connected
    AlreadyConnected,
}

impl ConnectOutcome {
    pub fn code(&self) -> i32 {
        match self {
            Self::Connected => 1,
            Self::AlreadyConnected => 2,
        }
    }
}

/// Result of a reachability probe
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PingOutcome {
    /// Round trip time in ms
    Reply(u32),
    /// The module reported a ping timeout
    TimedOut,
}

/// Firmware version information
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub at_version: String<64>,
    pub sdk_version: String<64>,
    pub compile_time: String<64>,
}

impl FirmwareVersion {
    pub(crate) fn parse(response: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            at_version: extract_line(response, MARKER_AT_VERSION)?,
            sdk_version: extract_line(response, MARKER_SDK_VERSION)?,
            compile_time: extract_line(response, MARKER_COMPILE_TIME)?,
        })
    }
}

/// Bounds-checked forward scanner over a response
pub(crate) struct Scanner<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Moves behind the next occurrence of `needle`. Returns false if not found.
    pub fn seek_past(&mut self, needle: &[u8]) -> bool {
        match find(self.rest(), needle) {
            Some(offset) => {
                self.position += offset + needle.len();
                true
            }
            None => false,
        }
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        Some(byte)
    }

    /// Consumes the given byte, fails on any other byte
    pub fn expect(&mut self, byte: u8) -> Option<()> {
        if self.peek()? != byte {
            return None;
        }

        self.position += 1;
        Some(())
    }

    /// Consumes all bytes up to and including `delimiter`, returning the bytes before it
    pub fn take_until(&mut self, delimiter: u8) -> Option<&'a [u8]> {
        let rest = self.rest();
        let length = rest.iter().position(|byte| *byte == delimiter)?;
        self.position += length + 1;
        Some(&rest[..length])
    }

    /// Consumes a run of ASCII digits with at most `max_digits` digits
    pub fn number(&mut self, max_digits: usize) -> Option<u32> {
        let rest = self.rest();
        let length = rest.iter().take_while(|byte| byte.is_ascii_digit()).count();
        if length == 0 || length > max_digits {
            return None;
        }

        self.position += length;
        rest[..length]
            .iter()
            .try_fold(0u32, |value, digit| value.checked_mul(10)?.checked_add((digit - b'0') as u32))
    }

    /// Consumes a dotted-decimal IPv4 address, each octet having at most 3 digits
    pub fn ipv4(&mut self) -> Option<Ipv4Addr> {
        let mut octets = [0u8; 4];

        for (index, octet) in octets.iter_mut().enumerate() {
            if index > 0 {
                self.expect(b'.')?;
            }

            *octet = u8::try_from(self.number(3)?).ok()?;
        }

        Some(Ipv4Addr::from(octets))
    }

    fn rest(&self) -> &'a [u8] {
        self.data.get(self.position..).unwrap_or(&[])
    }
}

/// Copies the characters following `marker` up to the next CR, LF or quote
pub(crate) fn extract_line<const N: usize>(response: &[u8], marker: &[u8]) -> Result<String<N>, Error> {
    let mut scanner = Scanner::new(response);
    if !scanner.seek_past(marker) {
        return Err(Error::Unknown);
    }

    let rest = scanner.rest();
    let end = rest
        .iter()
        .position(|byte| matches!(byte, b'\r' | b'\n' | b'"'))
        .unwrap_or(rest.len());
    let text = core::str::from_utf8(&rest[..end]).map_err(|_| Error::Unknown)?;

    let mut value = String::new();
    value.push_str(text).map_err(|_| Error::Unknown)?;
    Ok(value)
}

/// Parses the station IPv4 address of a CIFSR response
pub(crate) fn parse_station_ip(response: &[u8]) -> Result<Ipv4Addr, Error> {
    let mut scanner = Scanner::new(response);
    if !scanner.seek_past(MARKER_STATION_IP) {
        return Err(Error::Unknown);
    }

    scanner.ipv4().ok_or(Error::Unknown)
}

/// Parses the round trip time of a ping response, e.g. `+12\r\n\r\nOK\r\n`
pub(crate) fn parse_ping_reply(response: &[u8]) -> Result<u32, Error> {
    for line in response.split(|byte| *byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if let Some(value) = line.strip_prefix(b"+") {
            let mut scanner = Scanner::new(value);
            if let Some(time) = scanner.number(9) {
                if scanner.peek().is_none() {
                    return Ok(time);
                }
            }
        }
    }

    Err(Error::Unknown)
}

/// Parses the mode digit of a CWMODE query, e.g. `+CWMODE:1`
pub(crate) fn parse_mode_digit(response: &[u8]) -> Result<u8, Error> {
    let mut scanner = Scanner::new(response);
    if !scanner.seek_past(b":") {
        return Err(Error::Unknown);
    }

    match scanner.next_byte() {
        Some(digit @ b'1'..=b'3') => Ok(digit - b'0'),
        _ => Err(Error::Unknown),
    }
}
