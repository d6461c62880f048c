//! # Radio driver
//!
//! One method per AT command family. Every method performs a single command/response
//! transaction and maps the outcome to a typed result.
//!
//! ## Example
//!
//! ````
//! # use esp_at_driver::example::{ExampleTimer, ExampleTransport};
//! # use esp_at_driver::wifi::{Adapter, WifiDevice, WifiMode};
//! #
//! let mut adapter: Adapter<_, _, _, _, 1_000_000, 256> =
//!     Adapter::new(ExampleTransport::default(), ExampleTimer::default());
//!
//! adapter.test().unwrap();
//! adapter.set_mode(WifiMode::Station).unwrap();
//!
//! // Joining the target WIFI access point
//! adapter.join("test_wifi", "secret").unwrap();
//!
//! let ip = adapter.local_ip().unwrap();
//! assert_eq!("10.0.0.181", ip.to_string());
//!
//! let mac = adapter.local_mac().unwrap();
//! assert_eq!("10:fe:ed:05:ba:50", mac.as_str());
//! ````
use crate::buffer::BufferError;
use crate::commands::{
    is_valid_link_id, AccessPointConnectCommand, AccessPointDisconnectCommand, AccessPointQueryCommand,
    CloseSocketCommand, ConnectCommand, EchoCommand, MacAddressCommand, ObtainLocalAddressCommand, PingCommand,
    RestartCommand, ServerCommand, SetMultipleConnectionsCommand, StatusCommand, TestCommand, TransferModeCommand,
    TransmissionPrepareCommand, UartCommand, VersionCommand, WifiModeCommand,
};
use crate::config::{Config, DebugLevel, Timeouts};
use crate::responses::{
    extract_line, parse_mode_digit, parse_ping_reply, parse_station_ip, ConnectOutcome, FirmwareVersion,
    PingOutcome, ResponseOutcome, MARKER_ACCESS_POINT, MARKER_ALREADY, MARKER_MAC, MARKER_NO_AP,
    MARKER_PING_TIMEOUT, RESPONSE_ERROR, RESPONSE_FAIL, RESPONSE_OK, RESPONSE_READY, RESPONSE_SEND_OK,
    WIFI_DISCONNECT,
};
use crate::session::Session;
use crate::status::{Connectivity, RadioStatus, MAX_LINKS};
use crate::transport::{FlushDirection, ReadMode, Transport};
use core::convert::Infallible;
use core::fmt::Debug;
use core::net::Ipv4Addr;
use embedded_hal::digital::{ErrorType, OutputPin};
use fugit::{MillisDurationU32, TimerDurationU32};
use fugit_timer::Timer;
use heapless::String;
use numtoa::NumToA;

/// Max. payload length of a single send
pub const MAX_SEND_LENGTH: usize = 2048;

/// Max. SSID length in bytes
pub const MAX_SSID_LENGTH: usize = 32;

/// Max. password length in bytes
pub const MAX_PASSWORD_LENGTH: usize = 63;

/// Framing of the send confirmation: `\r\nRecv {n} bytes\r\n\r\nSEND OK\r\n`
const SEND_ECHO_PREFIX: &[u8] = b"\r\nRecv ";
const SEND_ECHO_SUFFIX: &[u8] = b" bytes\r\n\r\nSEND OK\r\n";

/// Driver errors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Precondition violated, no I/O was performed
    BadRequest,

    /// Allocation failure
    Memory,

    /// The module responded with the failure token
    ProtocolFail,

    /// Response was unexpected or could not be parsed
    Unknown,

    /// Nothing was received before the deadline
    Timeout,

    /// Writing to the transport failed
    WriteFailed,

    /// Asynchronous transactions are not supported
    AsynchronousUnsupported,

    /// Diagnostic commands require at least [DebugLevel::High]
    DiagnosticsDisabled,

    /// Given SSID is longer then the max. size of 32 bytes
    InvalidSsidLength,

    /// Given password is longer then the max. size of 63 bytes
    InvalidPasswordLength,

    /// Upstream timer error
    TimerError,

    /// Setting the reset or enable line failed
    PinError,
}

impl Error {
    /// Signed result code of the failure kind
    pub fn code(&self) -> i32 {
        match self {
            Error::Timeout => -1,
            Error::Memory => -4,
            Error::ProtocolFail => -3,
            Error::BadRequest | Error::InvalidSsidLength | Error::InvalidPasswordLength => -5,
            _ => -2,
        }
    }
}

impl From<BufferError> for Error {
    fn from(error: BufferError) -> Self {
        match error {
            BufferError::OutOfMemory => Error::Memory,
            BufferError::OutOfRange => Error::BadRequest,
        }
    }
}

/// WIFI mode of the module
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WifiMode {
    Station = 1,
    SoftAp = 2,
    StationSoftAp = 3,
}

impl TryFrom<u8> for WifiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Station),
            2 => Ok(Self::SoftAp),
            3 => Ok(Self::StationSoftAp),
            _ => Err(Error::Unknown),
        }
    }
}

/// Bookkeeping state of a link slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Available,
    Taken,
}

/// Placeholder for an unconnected reset or enable line
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Capabilities of an ESP-AT radio
pub trait WifiDevice {
    type Error: Debug;

    /// Responsiveness probe
    fn test(&mut self) -> Result<(), Self::Error>;

    /// Pulses the reset line and drains residual bytes
    fn hardware_reset(&mut self) -> Result<(), Self::Error>;

    /// Software restart, waits until the module is ready
    fn restart(&mut self) -> Result<(), Self::Error>;

    /// Hardware reset followed by a software restart
    fn reset(&mut self) -> Result<(), Self::Error>;

    fn enable(&mut self) -> Result<(), Self::Error>;

    fn disable(&mut self) -> Result<(), Self::Error>;

    fn set_mode(&mut self, mode: WifiMode) -> Result<(), Self::Error>;

    /// Joins an access point. An empty password joins an open network.
    fn join(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    /// Leaves the current access point
    fn leave(&mut self) -> Result<(), Self::Error>;

    fn local_ip(&mut self) -> Result<Ipv4Addr, Self::Error>;

    fn local_mac(&mut self) -> Result<String<17>, Self::Error>;

    /// Runs a status sweep and returns the decoded status
    fn refresh_status(&mut self) -> Result<RadioStatus, Self::Error>;

    /// True if the station got an IP and no link is connected
    fn network_status(&mut self) -> Result<bool, Self::Error>;

    /// Opens a TCP connection on the given link
    fn connect(&mut self, link_id: u8, host: &str, port: u16, keep_alive_ms: u32)
        -> Result<ConnectOutcome, Self::Error>;

    /// Sends the payload on the given link and returns the number of bytes sent
    fn send(&mut self, link_id: u8, data: &[u8]) -> Result<usize, Self::Error>;

    fn close(&mut self, link_id: u8) -> Result<(), Self::Error>;

    fn set_transfer_mode(&mut self, transparent: bool) -> Result<(), Self::Error>;

    fn set_multiplexing(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn configure_server(&mut self, port: u16, create: bool) -> Result<(), Self::Error>;

    /// True if the link is reported by a fresh status sweep
    fn is_link_connected(&mut self, link_id: u8) -> Result<bool, Self::Error>;

    /// Takes the first available link slot
    fn claim_link(&mut self) -> Option<u8>;

    /// Takes the given link slot. Returns false if it is out of range or already taken.
    fn take_link(&mut self, link_id: u8) -> bool;

    fn release_link(&mut self, link_id: u8);

    fn delay(&mut self, duration: MillisDurationU32) -> Result<(), Self::Error>;

    fn firmware_version(&mut self) -> Result<FirmwareVersion, Self::Error>;

    fn set_echo(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn set_baud(&mut self, baud: u32) -> Result<(), Self::Error>;

    fn mode(&mut self) -> Result<WifiMode, Self::Error>;

    /// SSID of the joined access point, None if not joined
    fn access_point(&mut self) -> Result<Option<String<32>>, Self::Error>;

    fn ping(&mut self, host: &str) -> Result<PingOutcome, Self::Error>;
}

/// Blocking ESP-AT driver
///
/// RX_SIZE: Chunk size in bytes of a single transport read.
pub struct Adapter<
    T: Transport,
    TM: Timer<TIMER_HZ>,
    RST: OutputPin,
    EN: OutputPin,
    const TIMER_HZ: u32,
    const RX_SIZE: usize,
> {
    /// Transaction session owning transport and buffers
    pub(crate) session: Session<T, RX_SIZE>,

    /// Timer used for delays
    pub(crate) timer: TM,

    pub(crate) reset_pin: Option<RST>,

    pub(crate) enable_pin: Option<EN>,

    pub(crate) config: Config,

    /// Result of the last status sweep
    pub(crate) status: RadioStatus,

    /// Link slot bookkeeping, array index = link_id
    pub(crate) links: [LinkState; MAX_LINKS],

    /// True if multiple connections have been enabled
    pub(crate) multiplexing: bool,
}

impl<T: Transport, TM: Timer<TIMER_HZ>, const TIMER_HZ: u32, const RX_SIZE: usize>
    Adapter<T, TM, NoPin, NoPin, TIMER_HZ, RX_SIZE>
{
    /// Creates a driver without reset and enable lines
    pub fn new(transport: T, timer: TM) -> Self {
        Self::with_pins(transport, timer, None, None)
    }
}

impl<T: Transport, TM: Timer<TIMER_HZ>, RST: OutputPin, EN: OutputPin, const TIMER_HZ: u32, const RX_SIZE: usize>
    Adapter<T, TM, RST, EN, TIMER_HZ, RX_SIZE>
{
    pub fn with_pins(transport: T, timer: TM, reset_pin: Option<RST>, enable_pin: Option<EN>) -> Self {
        let config = Config::default();

        Self {
            session: Session::new(transport, config.debug_level),
            timer,
            reset_pin,
            enable_pin,
            config,
            status: RadioStatus::default(),
            links: [LinkState::Available; MAX_LINKS],
            multiplexing: false,
        }
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
        self.session.set_debug_level(config.debug_level);
    }

    pub fn set_debug_level(&mut self, level: DebugLevel) {
        self.config.debug_level = level;
        self.session.set_debug_level(level);
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.config.timeouts = timeouts;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Status of the last sweep, without querying the module
    pub fn status(&self) -> &RadioStatus {
        &self.status
    }

    /// Raw response of the last transaction
    pub fn response(&self) -> &[u8] {
        self.session.response()
    }

    /// Reads raw bytes into the receive buffer, returns the number of bytes read
    pub fn read(&mut self, timeout: MillisDurationU32, length: usize, mode: ReadMode) -> Result<usize, Error> {
        self.session.clear_buffer();
        self.session.read(timeout, length, mode)
    }

    /// Returns the link id parameter depending on the multiplexing mode
    fn link_param(&self, link_id: u8) -> Result<Option<u8>, Error> {
        if !is_valid_link_id(link_id) {
            return Err(Error::BadRequest);
        }

        Ok(self.multiplexing.then_some(link_id))
    }

    fn ensure_diagnostics(&self) -> Result<(), Error> {
        if !self.config.diagnostics_enabled() {
            return Err(Error::DiagnosticsDisabled);
        }

        Ok(())
    }

    fn set_pin(pin: Option<&mut impl OutputPin>, high: bool) -> Result<(), Error> {
        let Some(pin) = pin else {
            return Ok(());
        };

        let result = if high { pin.set_high() } else { pin.set_low() };
        result.map_err(|_| Error::PinError)
    }
}

impl<T: Transport, TM: Timer<TIMER_HZ>, RST: OutputPin, EN: OutputPin, const TIMER_HZ: u32, const RX_SIZE: usize>
    WifiDevice for Adapter<T, TM, RST, EN, TIMER_HZ, RX_SIZE>
{
    type Error = Error;

    fn test(&mut self) -> Result<(), Error> {
        self.session.transact(&TestCommand, RESPONSE_OK, self.config.timeouts.command)?;
        Ok(())
    }

    fn hardware_reset(&mut self) -> Result<(), Error> {
        if self.reset_pin.is_some() {
            Self::set_pin(self.reset_pin.as_mut(), false)?;
            self.delay(self.config.reset_hold)?;
            Self::set_pin(self.reset_pin.as_mut(), true)?;
        }

        self.session.clear_buffer();
        let drained = self.session.read(self.config.drain_timeout, RX_SIZE, ReadMode::Blocking)?;
        if drained > 0 {
            log::debug!("Discarded {} bytes after hardware reset", drained);
        }

        self.session.flush(FlushDirection::Both)
    }

    fn restart(&mut self) -> Result<(), Error> {
        self.session.transact(&RestartCommand, RESPONSE_READY, self.config.timeouts.reset)?;
        self.delay(self.config.restart_settle)?;

        self.multiplexing = false;
        self.links = [LinkState::Available; MAX_LINKS];
        Ok(())
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.hardware_reset()?;
        self.restart()
    }

    fn enable(&mut self) -> Result<(), Error> {
        Self::set_pin(self.enable_pin.as_mut(), true)
    }

    fn disable(&mut self) -> Result<(), Error> {
        Self::set_pin(self.enable_pin.as_mut(), false)
    }

    fn set_mode(&mut self, mode: WifiMode) -> Result<(), Error> {
        let command = WifiModeCommand::set(mode as u8);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        Ok(())
    }

    fn join(&mut self, ssid: &str, password: &str) -> Result<(), Error> {
        if ssid.len() > MAX_SSID_LENGTH {
            return Err(Error::InvalidSsidLength);
        }

        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(Error::InvalidPasswordLength);
        }

        let password = (!password.is_empty()).then_some(password);
        let command = AccessPointConnectCommand::new(ssid, password);

        self.session
            .transact_dual(&command, RESPONSE_OK, RESPONSE_FAIL, self.config.timeouts.join)?
            .into_result()?;

        log::info!("Joined access point {}", ssid);
        Ok(())
    }

    fn leave(&mut self) -> Result<(), Error> {
        let timeout = self.config.timeouts.command;
        self.session.transact(&AccessPointDisconnectCommand, RESPONSE_OK, timeout)?;

        if !self.session.response_contains(WIFI_DISCONNECT) {
            let outcome = self.session.read_for_response(WIFI_DISCONNECT, timeout, None)?;
            if !outcome.is_success() {
                log::debug!("No disconnect notice received: {:?}", outcome);
            }
        }

        Ok(())
    }

    fn local_ip(&mut self) -> Result<Ipv4Addr, Error> {
        self.session
            .transact(&ObtainLocalAddressCommand, RESPONSE_OK, self.config.timeouts.command)?;
        parse_station_ip(self.session.response())
    }

    fn local_mac(&mut self) -> Result<String<17>, Error> {
        self.session
            .transact(&MacAddressCommand, RESPONSE_OK, self.config.timeouts.command)?;
        extract_line(self.session.response(), MARKER_MAC)
    }

    fn refresh_status(&mut self) -> Result<RadioStatus, Error> {
        self.session.transact(&StatusCommand, RESPONSE_OK, self.config.timeouts.command)?;
        self.status.decode(self.session.response())?;
        Ok(self.status)
    }

    fn network_status(&mut self) -> Result<bool, Error> {
        let status = self.refresh_status()?;
        Ok(matches!(status.connectivity, Connectivity::GotIp | Connectivity::Disconnected))
    }

    fn connect(&mut self, link_id: u8, host: &str, port: u16, keep_alive_ms: u32) -> Result<ConnectOutcome, Error> {
        let command = ConnectCommand::tcp(self.link_param(link_id)?, host, port, keep_alive_ms);
        let outcome =
            self.session
                .transact_dual(&command, RESPONSE_OK, RESPONSE_ERROR, self.config.timeouts.connect)?;

        match outcome {
            ResponseOutcome::Success(_) => Ok(ConnectOutcome::Connected),
            _ if self.session.response_contains(MARKER_ALREADY) => {
                log::debug!("Link {} is already connected", link_id);
                Ok(ConnectOutcome::AlreadyConnected)
            }
            failure => Err(failure.error().unwrap_or(Error::Unknown)),
        }
    }

    fn send(&mut self, link_id: u8, data: &[u8]) -> Result<usize, Error> {
        if data.len() > MAX_SEND_LENGTH {
            return Err(Error::BadRequest);
        }

        let command = TransmissionPrepareCommand::new(self.link_param(link_id)?, data.len());
        let timeout = self.config.timeouts.command;

        self.session
            .transact_dual(&command, RESPONSE_OK, RESPONSE_ERROR, timeout)?
            .into_result()?;
        self.session.write(data)?;

        let mut digits = [0u8; 20];
        let echo_length = SEND_ECHO_PREFIX.len() + data.len().numtoa(10, &mut digits).len() + SEND_ECHO_SUFFIX.len();

        self.session
            .read_for_response(RESPONSE_SEND_OK, timeout, Some(echo_length))?
            .into_result()?;

        Ok(data.len())
    }

    fn close(&mut self, link_id: u8) -> Result<(), Error> {
        let command = CloseSocketCommand::new(self.link_param(link_id)?);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        self.release_link(link_id);
        Ok(())
    }

    fn set_transfer_mode(&mut self, transparent: bool) -> Result<(), Error> {
        let command = TransferModeCommand::new(transparent);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        Ok(())
    }

    fn set_multiplexing(&mut self, enabled: bool) -> Result<(), Error> {
        let command = SetMultipleConnectionsCommand::new(enabled);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        self.multiplexing = enabled;
        Ok(())
    }

    fn configure_server(&mut self, port: u16, create: bool) -> Result<(), Error> {
        let command = ServerCommand::new(create, port);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        Ok(())
    }

    fn is_link_connected(&mut self, link_id: u8) -> Result<bool, Error> {
        if !is_valid_link_id(link_id) {
            return Err(Error::BadRequest);
        }

        let status = self.refresh_status()?;
        Ok(status.link(link_id).is_some())
    }

    fn claim_link(&mut self) -> Option<u8> {
        let index = self.links.iter().position(|state| *state == LinkState::Available)?;
        self.links[index] = LinkState::Taken;
        Some(index as u8)
    }

    fn take_link(&mut self, link_id: u8) -> bool {
        match self.links.get_mut(link_id as usize) {
            Some(state) if *state == LinkState::Available => {
                *state = LinkState::Taken;
                true
            }
            _ => false,
        }
    }

    fn release_link(&mut self, link_id: u8) {
        if let Some(state) = self.links.get_mut(link_id as usize) {
            *state = LinkState::Available;
        }
    }

    fn delay(&mut self, duration: MillisDurationU32) -> Result<(), Error> {
        self.timer
            .start(TimerDurationU32::millis(duration.to_millis()))
            .map_err(|_| Error::TimerError)?;
        nb::block!(self.timer.wait()).map_err(|_| Error::TimerError)
    }

    fn firmware_version(&mut self) -> Result<FirmwareVersion, Error> {
        self.ensure_diagnostics()?;
        self.session.transact(&VersionCommand, RESPONSE_OK, self.config.timeouts.command)?;
        FirmwareVersion::parse(self.session.response())
    }

    fn set_echo(&mut self, enabled: bool) -> Result<(), Error> {
        self.ensure_diagnostics()?;
        let command = EchoCommand::new(enabled);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        Ok(())
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), Error> {
        self.ensure_diagnostics()?;
        let command = UartCommand::new(baud);
        self.session.transact(&command, RESPONSE_OK, self.config.timeouts.command)?;
        Ok(())
    }

    fn mode(&mut self) -> Result<WifiMode, Error> {
        self.ensure_diagnostics()?;
        self.session
            .transact(&WifiModeCommand::query(), RESPONSE_OK, self.config.timeouts.command)?;
        WifiMode::try_from(parse_mode_digit(self.session.response())?)
    }

    fn access_point(&mut self) -> Result<Option<String<32>>, Error> {
        self.ensure_diagnostics()?;
        self.session
            .transact(&AccessPointQueryCommand, RESPONSE_OK, self.config.timeouts.command)?;

        if self.session.response_contains(MARKER_NO_AP) {
            return Ok(None);
        }

        extract_line(self.session.response(), MARKER_ACCESS_POINT).map(Some)
    }

    fn ping(&mut self, host: &str) -> Result<PingOutcome, Error> {
        self.ensure_diagnostics()?;
        let command = PingCommand::new(host);
        let outcome = self
            .session
            .transact_dual(&command, RESPONSE_OK, RESPONSE_ERROR, self.config.timeouts.ping)?;

        match outcome {
            ResponseOutcome::Success(_) => Ok(PingOutcome::Reply(parse_ping_reply(self.session.response())?)),
            _ if self.session.response_contains(MARKER_PING_TIMEOUT) => Ok(PingOutcome::TimedOut),
            failure => Err(failure.error().unwrap_or(Error::Unknown)),
        }
    }
}
