//! # Socket adapter
//!
//! Stream socket on top of a [WifiDevice]. Owns the reset sequencing of the module, joining the
//! network and the server or client setup. All retries are bounded by a [RetryPolicy] and can be
//! cancelled by the caller.
//!
//! ## Example
//!
//! ````
//! # use core::sync::atomic::AtomicBool;
//! # use embedded_io::Write;
//! # use esp_at_driver::example::{ExampleTimer, ExampleTransport};
//! # use esp_at_driver::stack::{Socket, SocketOptions, SocketState};
//! # use esp_at_driver::wifi::Adapter;
//! #
//! let adapter: Adapter<_, _, _, _, 1_000_000, 256> =
//!     Adapter::new(ExampleTransport::default(), ExampleTimer::default());
//!
//! let cancel = AtomicBool::new(false);
//! let mut socket = Socket::new(adapter, SocketOptions::default());
//!
//! // Resets the module and connects to the remote host
//! socket.open("test_wifi", "secret", "10.0.0.1", 21, &cancel).unwrap();
//! assert_eq!(SocketState::ClientReady, socket.state());
//!
//! socket.write_all(b"hallo!").unwrap();
//! socket.close().unwrap();
//! ````
use crate::retry::{RetryPolicy, RetryStep};
use crate::status::Role;
use crate::wifi::{WifiDevice, WifiMode, MAX_SEND_LENGTH};
use core::net::Ipv4Addr;
use core::sync::atomic::AtomicBool;
use embedded_io::ErrorKind;
use fugit::ExtU32;
use heapless::String;

/// Socket configuration, fixed at construction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SocketOptions {
    pub role: Role,

    /// TCP keep alive of client connections in ms, 0 = disabled
    pub keep_alive_ms: u32,

    /// Enables multiple connections in client role. Always enabled in server role.
    pub multiplexing: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            role: Role::Client,
            keep_alive_ms: 0,
            multiplexing: true,
        }
    }
}

/// Lifecycle state of the socket
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    /// Resetting and probing the module
    Handshaking,
    /// Joining the access point
    Joining,
    /// Server port is bound, waiting for clients
    ServerReady,
    /// Connected to the remote host
    ClientReady,
}

/// Retried stage of the lifecycle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Handshake,
    Join,
    Connect,
}

/// Socket errors
#[derive(Clone, Debug, PartialEq)]
pub enum Error<E> {
    /// Device operation failed
    Device(E),

    /// Retry budget of the given stage is spent, carries the error of the last attempt
    Exhausted { stage: Stage, last: E },

    /// Cancellation flag was raised by the caller
    Cancelled,

    /// Unable to send data if socket is not connected
    NotConnected,

    /// No link available, since the maximum number is in use
    NoLinkAvailable,

    /// Operation is not supported in the current state or role
    InvalidState,
}

impl<E: core::fmt::Debug> embedded_io::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Exhausted { .. } => ErrorKind::TimedOut,
            Error::Cancelled => ErrorKind::Interrupted,
            Error::InvalidState => ErrorKind::InvalidInput,
            Error::Device(_) | Error::NoLinkAvailable => ErrorKind::Other,
        }
    }
}

/// Stream socket bound to a single link of the module
pub struct Socket<D: WifiDevice> {
    pub(crate) device: D,

    options: SocketOptions,

    state: SocketState,

    /// True once the module was reset and answered the probe
    handshaken: bool,

    /// Link used by this socket
    link_id: Option<u8>,

    /// Cleared immediately on close, independent of the module acknowledgement
    connected: bool,

    local_ip: Option<Ipv4Addr>,

    mac: Option<String<17>>,

    handshake_retry: RetryPolicy,

    join_retry: RetryPolicy,

    connect_retry: RetryPolicy,
}

impl<D: WifiDevice> Socket<D> {
    pub fn new(device: D, options: SocketOptions) -> Self {
        Self {
            device,
            options,
            state: SocketState::Disconnected,
            handshaken: false,
            link_id: None,
            connected: false,
            local_ip: None,
            mac: None,
            handshake_retry: RetryPolicy::fixed(10, 1_000.millis()),
            join_retry: RetryPolicy::fixed(5, 5_000.millis()),
            connect_retry: RetryPolicy::exponential(5, 1_000.millis(), 8_000.millis()),
        }
    }

    /// Overrides the retry policy of the given stage
    pub fn set_retry_policy(&mut self, stage: Stage, policy: RetryPolicy) {
        match stage {
            Stage::Handshake => self.handshake_retry = policy,
            Stage::Join => self.join_retry = policy,
            Stage::Connect => self.connect_retry = policy,
        }
    }

    /// Resets the module until it answers the responsiveness probe and switches to station mode
    pub fn begin(&mut self, cancel: &AtomicBool) -> Result<(), Error<D::Error>> {
        self.state = SocketState::Handshaking;

        let result = Self::retry(&mut self.device, Stage::Handshake, self.handshake_retry, cancel, |device| {
            if let Err(error) = device.reset() {
                log::warn!("Resetting module failed: {:?}", error);
            }

            device.test()?;
            device.set_mode(WifiMode::Station)
        });

        if let Err(error) = result {
            self.state = SocketState::Disconnected;
            return Err(error);
        }

        self.handshaken = true;
        match self.device.local_mac() {
            Ok(mac) => {
                log::info!("Module ready, MAC {}", mac.as_str());
                self.mac = Some(mac);
            }
            Err(error) => log::warn!("Reading MAC address failed: {:?}", error),
        }

        Ok(())
    }

    /// Joins the network and sets up the socket for its role
    ///
    /// In server role `port` is the listening port and `host` is ignored. Fails with
    /// [Error::InvalidState] if the socket is already open.
    pub fn open(
        &mut self,
        ssid: &str,
        password: &str,
        host: &str,
        port: u16,
        cancel: &AtomicBool,
    ) -> Result<(), Error<D::Error>> {
        if matches!(self.state, SocketState::ClientReady | SocketState::ServerReady) {
            return Err(Error::InvalidState);
        }

        if !self.handshaken {
            self.begin(cancel)?;
        }

        self.state = SocketState::Joining;
        let result = Self::retry(&mut self.device, Stage::Join, self.join_retry, cancel, |device| {
            device.test()?;
            device.join(ssid, password)
        })
        .and_then(|_| {
            self.record_local_ip();

            match self.options.role {
                Role::Server => self.setup_server(port),
                Role::Client => self.setup_client(host, port, cancel),
            }
        });

        if let Err(error) = result {
            self.state = SocketState::Disconnected;
            return Err(error);
        }

        Ok(())
    }

    /// Adopts the first server link not used yet. Returns None if no client is connected.
    pub fn accept(&mut self) -> Result<Option<u8>, Error<D::Error>> {
        if self.state != SocketState::ServerReady {
            return Err(Error::InvalidState);
        }

        let status = self.device.refresh_status().map_err(Error::Device)?;

        for record in status.links.iter().filter(|record| record.is_assigned()) {
            if record.role == Role::Server && self.device.take_link(record.link_id) {
                log::info!(
                    "Accepted link {} from {}:{}",
                    record.link_id,
                    record.remote_address,
                    record.remote_port
                );

                self.link_id = Some(record.link_id);
                self.connected = true;
                return Ok(Some(record.link_id));
            }
        }

        Ok(None)
    }

    /// Closes the link of the socket
    ///
    /// The socket counts as disconnected even if the module rejects the close command.
    pub fn close(&mut self) -> Result<(), Error<D::Error>> {
        self.connected = false;

        if self.state == SocketState::ClientReady {
            self.state = SocketState::Disconnected;
        }

        let Some(link_id) = self.link_id.take() else {
            return Ok(());
        };

        let result = self.device.close(link_id);
        self.device.release_link(link_id);
        result.map_err(Error::Device)
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn link_id(&self) -> Option<u8> {
        self.link_id
    }

    /// Station IP recorded after joining
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.local_ip
    }

    /// MAC address recorded after the handshake
    pub fn mac(&self) -> Option<&str> {
        self.mac.as_ref().map(|mac| mac.as_str())
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    pub fn device(&mut self) -> &mut D {
        &mut self.device
    }

    /// Returns the underlying device
    pub fn release(self) -> D {
        self.device
    }

    fn setup_server(&mut self, port: u16) -> Result<(), Error<D::Error>> {
        self.device.set_multiplexing(false).map_err(Error::Device)?;
        self.device.set_transfer_mode(false).map_err(Error::Device)?;
        self.device.set_multiplexing(true).map_err(Error::Device)?;
        self.device.configure_server(port, true).map_err(Error::Device)?;

        log::info!("Listening on port {}", port);
        self.state = SocketState::ServerReady;
        Ok(())
    }

    fn setup_client(&mut self, host: &str, port: u16, cancel: &AtomicBool) -> Result<(), Error<D::Error>> {
        self.device
            .set_multiplexing(self.options.multiplexing)
            .map_err(Error::Device)?;

        let link_id = self.device.claim_link().ok_or(Error::NoLinkAvailable)?;
        let keep_alive_ms = self.options.keep_alive_ms;

        let result = Self::retry(&mut self.device, Stage::Connect, self.connect_retry, cancel, |device| {
            device.connect(link_id, host, port, keep_alive_ms)
        });

        match result {
            Ok(outcome) => {
                log::info!("Link {} to {}:{} open ({:?})", link_id, host, port, outcome);
                self.link_id = Some(link_id);
                self.connected = true;
                self.state = SocketState::ClientReady;
                Ok(())
            }
            Err(error) => {
                self.device.release_link(link_id);
                Err(error)
            }
        }
    }

    fn record_local_ip(&mut self) {
        match self.device.local_ip() {
            Ok(ip) => {
                log::info!("Joined network, local IP {}", ip);
                self.local_ip = Some(ip);
            }
            Err(error) => log::warn!("Reading local IP failed: {:?}", error),
        }
    }

    /// Runs `attempt` until it succeeds, the policy is exhausted or `cancel` is raised
    fn retry<R>(
        device: &mut D,
        stage: Stage,
        policy: RetryPolicy,
        cancel: &AtomicBool,
        mut attempt: impl FnMut(&mut D) -> Result<R, D::Error>,
    ) -> Result<R, Error<D::Error>> {
        let mut retry = policy.start(cancel);

        loop {
            if retry.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let error = match attempt(device) {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match retry.next() {
                RetryStep::Wait(delay) => {
                    log::warn!(
                        "{:?} attempt {} failed: {:?}, retrying in {} ms",
                        stage,
                        retry.failures(),
                        error,
                        delay.to_millis()
                    );
                    device.delay(delay).map_err(Error::Device)?;
                }
                RetryStep::Exhausted => {
                    log::warn!("{:?} failed after {} attempts: {:?}", stage, retry.failures(), error);
                    return Err(Error::Exhausted { stage, last: error });
                }
                RetryStep::Cancelled => return Err(Error::Cancelled),
            }
        }
    }
}

impl<D: WifiDevice> embedded_io::ErrorType for Socket<D> {
    type Error = Error<D::Error>;
}

impl<D: WifiDevice> embedded_io::Write for Socket<D> {
    /// Sends at most 2048 bytes per call
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let link_id = match (self.connected, self.link_id) {
            (true, Some(link_id)) => link_id,
            _ => return Err(Error::NotConnected),
        };

        let length = buf.len().min(MAX_SEND_LENGTH);
        self.device.send(link_id, &buf[..length]).map_err(Error::Device)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
