//! # Status decoder
//!
//! Decodes the response of a `AT+CIPSTATUS` sweep:
//!
//! ````text
//! STATUS:3
//! +CIPSTATUS:0,"TCP","192.168.0.100",54723,1
//! +CIPSTATUS:1,"TCP","192.168.0.101",54724,1
//!
//! OK
//! ````
use crate::responses::Scanner;
use crate::wifi::Error;
use core::net::Ipv4Addr;

/// Number of links the module multiplexes
pub const MAX_LINKS: usize = 5;

/// Link id of an unassigned status slot
pub const LINK_UNASSIGNED: u8 = 255;

const MARKER_STATUS: &[u8] = b"STATUS:";
const MARKER_LINK: &[u8] = b"+CIPSTATUS:";

/// Network connectivity as reported by the status sweep
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Station got an IP from the access point
    GotIp = 2,
    /// Links are connected
    Connected = 3,
    /// All links are disconnected
    Disconnected = 4,
    /// Station is not joined to any network
    NoRadio = 5,
}

impl Connectivity {
    fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'2' => Some(Self::GotIp),
            b'3' => Some(Self::Connected),
            b'4' => Some(Self::Disconnected),
            b'5' => Some(Self::NoRadio),
            _ => None,
        }
    }
}

/// Transport protocol of a link
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    Tcp,
    Udp,
    Undefined,
}

/// Which side opened a link
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// State of a single link
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinkRecord {
    /// Link id in [0, 5), [LINK_UNASSIGNED] for unused slots
    pub link_id: u8,
    pub connection_type: ConnectionType,
    pub remote_address: Ipv4Addr,
    pub remote_port: u16,
    pub role: Role,
}

impl LinkRecord {
    pub const UNASSIGNED: Self = Self {
        link_id: LINK_UNASSIGNED,
        connection_type: ConnectionType::Undefined,
        remote_address: Ipv4Addr::UNSPECIFIED,
        remote_port: 0,
        role: Role::Client,
    };

    pub fn is_assigned(&self) -> bool {
        self.link_id != LINK_UNASSIGNED
    }
}

impl Default for LinkRecord {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

/// Result of the last status sweep
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RadioStatus {
    pub connectivity: Connectivity,

    /// Array index = link id
    pub links: [LinkRecord; MAX_LINKS],
}

impl Default for RadioStatus {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::NoRadio,
            links: [LinkRecord::UNASSIGNED; MAX_LINKS],
        }
    }
}

impl RadioStatus {
    /// Returns the record of the given link if assigned
    pub fn link(&self, link_id: u8) -> Option<&LinkRecord> {
        self.links.get(link_id as usize).filter(|record| record.is_assigned())
    }

    /// Updates the status from a status sweep response.
    ///
    /// Links not listed in the response are marked as unassigned. A record with a link id out of
    /// range stops parsing, leaving the remaining slots untouched.
    /// The status is left unchanged if the response is malformed.
    pub fn decode(&mut self, response: &[u8]) -> Result<(), Error> {
        let mut update = *self;
        update.apply(response)?;
        *self = update;
        Ok(())
    }

    fn apply(&mut self, response: &[u8]) -> Result<(), Error> {
        let mut scanner = Scanner::new(response);
        if !scanner.seek_past(MARKER_STATUS) {
            return Err(Error::Unknown);
        }

        self.connectivity = scanner
            .next_byte()
            .and_then(Connectivity::from_digit)
            .ok_or(Error::Unknown)?;

        let mut populated = [false; MAX_LINKS];

        while scanner.seek_past(MARKER_LINK) {
            let link_id = match scanner.next_byte() {
                Some(digit) if digit.is_ascii_digit() => digit - b'0',
                _ => return Err(Error::Unknown),
            };

            if link_id as usize >= MAX_LINKS {
                return Ok(());
            }

            self.links[link_id as usize] = decode_record(&mut scanner, link_id).ok_or(Error::Unknown)?;
            populated[link_id as usize] = true;
        }

        for (record, populated) in self.links.iter_mut().zip(populated) {
            if !populated {
                record.link_id = LINK_UNASSIGNED;
            }
        }

        Ok(())
    }
}

/// Decodes the rest of a link record: `,"TCP","93.184.216.34",80,0`
fn decode_record(scanner: &mut Scanner, link_id: u8) -> Option<LinkRecord> {
    scanner.expect(b',')?;
    scanner.expect(b'"')?;

    let connection_type = match scanner.take_until(b'"')?.first() {
        Some(b'T') => ConnectionType::Tcp,
        Some(b'U') => ConnectionType::Udp,
        _ => ConnectionType::Undefined,
    };

    scanner.expect(b',')?;
    scanner.expect(b'"')?;
    let remote_address = scanner.ipv4()?;
    scanner.expect(b'"')?;

    scanner.expect(b',')?;
    let remote_port = u16::try_from(scanner.number(5)?).ok()?;

    scanner.expect(b',')?;
    let role = match scanner.next_byte()? {
        b'0' => Role::Client,
        b'1' => Role::Server,
        _ => return None,
    };

    Some(LinkRecord {
        link_id,
        connection_type,
        remote_address,
        remote_port,
        role,
    })
}
