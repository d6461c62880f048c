//! # Command codec
//!
//! A frame is `AT` + keyword + kind suffix + CRLF. Parameters are written verbatim, so string
//! values are wrapped in double quotes by the commands below.
use crate::buffer::{BufferError, ByteBuffer};
use crate::status::MAX_LINKS;
use numtoa::NumToA;

/// Frame prefix of every command
pub const PREFIX: &[u8] = b"AT";

/// Line terminator of every command
pub const TERMINATOR: &[u8] = b"\r\n";

/// Determines the suffix following the keyword
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// Appends `?`
    Query,
    /// Appends `=` followed by the parameters
    Setup,
    /// Appends nothing
    Execute,
}

/// A single AT command
pub trait AtCommand {
    /// Keyword following the `AT` prefix, e.g. `+CWMODE`
    fn keyword(&self) -> &'static str;

    fn kind(&self) -> CommandKind;

    /// Serializes the parameters of a setup command
    fn write_params(&self, _params: &mut ByteBuffer) -> Result<(), BufferError> {
        Ok(())
    }
}

/// Encodes a full command frame into `frame`, returning the frame length
pub fn encode(keyword: &str, kind: CommandKind, params: &[u8], frame: &mut ByteBuffer) -> Result<usize, BufferError> {
    frame.clear();
    frame.append_slice(PREFIX)?;
    frame.append_str(keyword)?;

    match kind {
        CommandKind::Query => {
            frame.append_byte(b'?')?;
        }
        CommandKind::Setup => {
            frame.append_byte(b'=')?;
            frame.append_slice(params)?;
        }
        CommandKind::Execute => {}
    }

    frame.append_slice(TERMINATOR)?;
    Ok(frame.len())
}

/// Encodes the given command, using `params` as scratch space for its parameters
pub fn encode_command<C: AtCommand + ?Sized>(
    command: &C,
    params: &mut ByteBuffer,
    frame: &mut ByteBuffer,
) -> Result<usize, BufferError> {
    params.clear();
    if command.kind() == CommandKind::Setup {
        command.write_params(params)?;
    }

    encode(command.keyword(), command.kind(), params.as_slice(), frame)
}

/// Appends a string wrapped in literal double quotes
pub(crate) fn append_quoted(params: &mut ByteBuffer, value: &str) -> Result<usize, BufferError> {
    let offset = params.append_byte(b'"')?;
    params.append_str(value)?;
    params.append_byte(b'"')?;
    Ok(offset)
}

/// Appends the decimal representation of the given number
pub(crate) fn append_number(params: &mut ByteBuffer, value: u32) -> Result<usize, BufferError> {
    let mut digits = [0u8; 20];
    params.append_slice(value.numtoa(10, &mut digits))
}

/// Appends the link id followed by a comma if multiplexing is enabled
fn append_link_id(params: &mut ByteBuffer, link_id: Option<u8>) -> Result<(), BufferError> {
    if let Some(link_id) = link_id {
        append_number(params, link_id as u32)?;
        params.append_byte(b',')?;
    }

    Ok(())
}

/// Module responsiveness probe, `AT`
#[derive(Clone, Default)]
pub struct TestCommand;

impl AtCommand for TestCommand {
    fn keyword(&self) -> &'static str {
        ""
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// Software restart
#[derive(Clone, Default)]
pub struct RestartCommand;

impl AtCommand for RestartCommand {
    fn keyword(&self) -> &'static str {
        "+RST"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// Firmware version information
#[derive(Clone, Default)]
pub struct VersionCommand;

impl AtCommand for VersionCommand {
    fn keyword(&self) -> &'static str {
        "+GMR"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// Enables/Disables the command echo
#[derive(Clone)]
pub struct EchoCommand {
    enabled: bool,
}

impl EchoCommand {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl AtCommand for EchoCommand {
    fn keyword(&self) -> &'static str {
        if self.enabled {
            "E1"
        } else {
            "E0"
        }
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// UART configuration, always 8 data bits, 1 stop bit, no parity, no flow control
#[derive(Clone)]
pub struct UartCommand {
    baud: u32,
}

impl UartCommand {
    pub const MIN_BAUD: u32 = 110;
    pub const MAX_BAUD: u32 = 115_200;

    /// Baud rate is clamped to the supported range
    pub fn new(baud: u32) -> Self {
        Self {
            baud: baud.clamp(Self::MIN_BAUD, Self::MAX_BAUD),
        }
    }
}

impl AtCommand for UartCommand {
    fn keyword(&self) -> &'static str {
        "+UART"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_number(params, self.baud)?;
        params.append_str(",8,1,0,0")?;
        Ok(())
    }
}

/// Sets or queries the WIFI mode
#[derive(Clone)]
pub struct WifiModeCommand {
    /// WIFI mode, None for querying:
    ///     1: Station mode.
    ///     2: SoftAP mode.
    ///     3: SoftAP+Station mode.
    mode: Option<u8>,
}

impl WifiModeCommand {
    pub fn set(mode: u8) -> Self {
        Self { mode: Some(mode) }
    }

    pub fn query() -> Self {
        Self { mode: None }
    }
}

impl AtCommand for WifiModeCommand {
    fn keyword(&self) -> &'static str {
        "+CWMODE"
    }

    fn kind(&self) -> CommandKind {
        match self.mode {
            Some(_) => CommandKind::Setup,
            None => CommandKind::Query,
        }
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        if let Some(mode) = self.mode {
            append_number(params, mode as u32)?;
        }

        Ok(())
    }
}

/// Command for joining the target WIFI access point
#[derive(Clone)]
pub struct AccessPointConnectCommand<'a> {
    /// The SSID of the target access point
    ssid: &'a str,

    /// The password/key of the target access point, omitted for open networks
    password: Option<&'a str>,
}

impl<'a> AccessPointConnectCommand<'a> {
    pub fn new(ssid: &'a str, password: Option<&'a str>) -> Self {
        Self { ssid, password }
    }
}

impl AtCommand for AccessPointConnectCommand<'_> {
    fn keyword(&self) -> &'static str {
        "+CWJAP"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_quoted(params, self.ssid)?;

        if let Some(password) = self.password {
            params.append_byte(b',')?;
            append_quoted(params, password)?;
        }

        Ok(())
    }
}

/// Queries the currently joined access point
#[derive(Clone, Default)]
pub struct AccessPointQueryCommand;

impl AtCommand for AccessPointQueryCommand {
    fn keyword(&self) -> &'static str {
        "+CWJAP"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Query
    }
}

/// Leaves the current access point
#[derive(Clone, Default)]
pub struct AccessPointDisconnectCommand;

impl AtCommand for AccessPointDisconnectCommand {
    fn keyword(&self) -> &'static str {
        "+CWQAP"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// Connection status sweep of all links
#[derive(Clone, Default)]
pub struct StatusCommand;

impl AtCommand for StatusCommand {
    fn keyword(&self) -> &'static str {
        "+CIPSTATUS"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// Command for receiving local address information
#[derive(Clone, Default)]
pub struct ObtainLocalAddressCommand;

impl AtCommand for ObtainLocalAddressCommand {
    fn keyword(&self) -> &'static str {
        "+CIFSR"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Execute
    }
}

/// Queries the station MAC address
#[derive(Clone, Default)]
pub struct MacAddressCommand;

impl AtCommand for MacAddressCommand {
    fn keyword(&self) -> &'static str {
        "+CIPSTAMAC"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Query
    }
}

/// Establish TCP Connection
#[derive(Clone)]
pub struct ConnectCommand<'a> {
    /// Link id, omitted in single connection mode
    link_id: Option<u8>,

    /// Remote host name or IPv4 address
    remote_host: &'a str,

    /// Remote port
    port: u16,

    /// TCP keep alive in units of 500 ms, 0 = disabled
    keep_alive: u16,
}

impl<'a> ConnectCommand<'a> {
    /// Max. keep alive value in units of 500 ms (= 60 minutes)
    pub const MAX_KEEP_ALIVE: u32 = 7200;

    pub fn tcp(link_id: Option<u8>, remote_host: &'a str, port: u16, keep_alive_ms: u32) -> Self {
        Self {
            link_id,
            remote_host,
            port,
            keep_alive: (keep_alive_ms / 500).min(Self::MAX_KEEP_ALIVE) as u16,
        }
    }
}

impl AtCommand for ConnectCommand<'_> {
    fn keyword(&self) -> &'static str {
        "+CIPSTART"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_link_id(params, self.link_id)?;
        append_quoted(params, "TCP")?;
        params.append_byte(b',')?;
        append_quoted(params, self.remote_host)?;
        params.append_byte(b',')?;
        append_number(params, self.port as u32)?;

        if self.keep_alive > 0 {
            params.append_byte(b',')?;
            append_number(params, self.keep_alive as u32)?;
        }

        Ok(())
    }
}

/// Initiates the transmission of data
#[derive(Clone)]
pub struct TransmissionPrepareCommand {
    /// Link id, omitted in single connection mode
    link_id: Option<u8>,

    /// Length of the payload which follows
    length: usize,
}

impl TransmissionPrepareCommand {
    pub fn new(link_id: Option<u8>, length: usize) -> Self {
        Self { link_id, length }
    }
}

impl AtCommand for TransmissionPrepareCommand {
    fn keyword(&self) -> &'static str {
        "+CIPSEND"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_link_id(params, self.link_id)?;
        append_number(params, self.length as u32)?;
        Ok(())
    }
}

/// Closes a link
#[derive(Clone)]
pub struct CloseSocketCommand {
    /// Link id, omitted in single connection mode
    link_id: Option<u8>,
}

impl CloseSocketCommand {
    pub fn new(link_id: Option<u8>) -> Self {
        Self { link_id }
    }
}

impl AtCommand for CloseSocketCommand {
    fn keyword(&self) -> &'static str {
        "+CIPCLOSE"
    }

    fn kind(&self) -> CommandKind {
        match self.link_id {
            Some(_) => CommandKind::Setup,
            None => CommandKind::Execute,
        }
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        if let Some(link_id) = self.link_id {
            append_number(params, link_id as u32)?;
        }

        Ok(())
    }
}

/// Sets the transfer mode
#[derive(Clone)]
pub struct TransferModeCommand {
    /// 0: normal mode, 1: passthrough (transparent) mode
    mode: u8,
}

impl TransferModeCommand {
    pub fn new(transparent: bool) -> Self {
        Self {
            mode: transparent as u8,
        }
    }
}

impl AtCommand for TransferModeCommand {
    fn keyword(&self) -> &'static str {
        "+CIPMODE"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_number(params, self.mode as u32)?;
        Ok(())
    }
}

/// Enables/Disables multiple connections
#[derive(Clone)]
pub struct SetMultipleConnectionsCommand {
    /// 0: single connection, 1: multiple connections
    mode: u8,
}

impl SetMultipleConnectionsCommand {
    pub fn new(enabled: bool) -> Self {
        Self { mode: enabled as u8 }
    }

    /// Enables multiple connections
    pub fn multiple() -> Self {
        Self::new(true)
    }

    /// Restricts the module to a single connection
    pub fn single() -> Self {
        Self::new(false)
    }
}

impl AtCommand for SetMultipleConnectionsCommand {
    fn keyword(&self) -> &'static str {
        "+CIPMUX"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_number(params, self.mode as u32)?;
        Ok(())
    }
}

/// Creates or deletes a TCP server
#[derive(Clone)]
pub struct ServerCommand {
    /// 0: delete server, 1: create server
    create: u8,

    /// Listening port
    port: u16,
}

impl ServerCommand {
    pub fn new(create: bool, port: u16) -> Self {
        Self {
            create: create as u8,
            port,
        }
    }
}

impl AtCommand for ServerCommand {
    fn keyword(&self) -> &'static str {
        "+CIPSERVER"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_number(params, self.create as u32)?;
        params.append_byte(b',')?;
        append_number(params, self.port as u32)?;
        Ok(())
    }
}

/// Reachability probe of a remote host
#[derive(Clone)]
pub struct PingCommand<'a> {
    /// Host name or IPv4 address
    host: &'a str,
}

impl<'a> PingCommand<'a> {
    pub fn new(host: &'a str) -> Self {
        Self { host }
    }
}

impl AtCommand for PingCommand<'_> {
    fn keyword(&self) -> &'static str {
        "+PING"
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Setup
    }

    fn write_params(&self, params: &mut ByteBuffer) -> Result<(), BufferError> {
        append_quoted(params, self.host)?;
        Ok(())
    }
}

/// Returns true if the link id is inside the supported range
pub(crate) fn is_valid_link_id(link_id: u8) -> bool {
    (link_id as usize) < MAX_LINKS
}
