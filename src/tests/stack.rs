use crate::responses::ConnectOutcome;
use crate::retry::RetryPolicy;
use crate::stack::{Error, Socket, SocketOptions, SocketState, Stage};
use crate::status::{ConnectionType, Connectivity, LinkRecord, RadioStatus, Role};
use crate::tests::mock::MockDevice;
use crate::wifi::{Error as WifiError, WifiMode};
use alloc::vec;
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};
use embedded_io::{Error as _, ErrorKind, Write};
use fugit::ExtU32;
use heapless::String;
use mockall::Sequence;

const MAC: &str = "10:fe:ed:05:ba:50";

/// Device accepting a single successful handshake
fn handshaken_device() -> MockDevice {
    let mut device = MockDevice::new();
    device.expect_reset().times(1).returning(|| Ok(()));
    device.expect_test().returning(|| Ok(()));
    device
        .expect_set_mode()
        .times(1)
        .withf(|mode| *mode == WifiMode::Station)
        .returning(|_| Ok(()));
    device
        .expect_local_mac()
        .times(1)
        .returning(|| Ok(String::try_from(MAC).unwrap()));
    device
}

/// Device accepting a handshake and a single successful join
fn joined_device() -> MockDevice {
    let mut device = handshaken_device();
    device.expect_join().times(1).returning(|_, _| Ok(()));
    device
        .expect_local_ip()
        .times(1)
        .returning(|| Ok(Ipv4Addr::new(10, 0, 0, 181)));
    device
}

fn client_socket() -> Socket<MockDevice> {
    let mut device = joined_device();
    device.expect_set_multiplexing().times(1).returning(|_| Ok(()));
    device.expect_claim_link().times(1).returning(|| Some(0));
    device
        .expect_connect()
        .times(1)
        .returning(|_, _, _, _| Ok(ConnectOutcome::Connected));

    let mut socket = Socket::new(device, SocketOptions::default());
    socket
        .open("test_wifi", "secret", "10.0.0.1", 21, &AtomicBool::new(false))
        .unwrap();
    socket
}

fn server_socket() -> Socket<MockDevice> {
    let mut device = joined_device();
    device.expect_set_multiplexing().times(2).returning(|_| Ok(()));
    device.expect_set_transfer_mode().times(1).returning(|_| Ok(()));
    device.expect_configure_server().times(1).returning(|_, _| Ok(()));

    let options = SocketOptions {
        role: Role::Server,
        ..SocketOptions::default()
    };

    let mut socket = Socket::new(device, options);
    socket
        .open("test_wifi", "secret", "", 333, &AtomicBool::new(false))
        .unwrap();
    socket
}

fn link(link_id: u8, role: Role) -> LinkRecord {
    LinkRecord {
        link_id,
        connection_type: ConnectionType::Tcp,
        remote_address: Ipv4Addr::new(10, 0, 0, 20 + link_id),
        remote_port: 50_000 + link_id as u16,
        role,
    }
}

#[test]
fn test_begin_retries_until_responsive() {
    let mut device = MockDevice::new();
    device.expect_reset().times(3).returning(|| Err(WifiError::Timeout));

    let mut probes = 0;
    device.expect_test().times(3).returning(move || {
        probes += 1;
        if probes < 3 {
            Err(WifiError::Timeout)
        } else {
            Ok(())
        }
    });

    device.expect_delay().times(2).returning(|duration| {
        assert_eq!(1_000, duration.to_millis());
        Ok(())
    });
    device.expect_set_mode().times(1).returning(|_| Ok(()));
    device
        .expect_local_mac()
        .times(1)
        .returning(|| Ok(String::try_from(MAC).unwrap()));

    let mut socket = Socket::new(device, SocketOptions::default());
    socket.begin(&AtomicBool::new(false)).unwrap();

    assert_eq!(Some(MAC), socket.mac());
    assert_eq!(SocketState::Handshaking, socket.state());
}

#[test]
fn test_begin_exhausted() {
    let mut device = MockDevice::new();
    device.expect_reset().times(3).returning(|| Ok(()));
    device.expect_test().times(3).returning(|| Err(WifiError::Timeout));
    device.expect_delay().times(2).returning(|duration| {
        assert_eq!(500, duration.to_millis());
        Ok(())
    });

    let mut socket = Socket::new(device, SocketOptions::default());
    socket.set_retry_policy(Stage::Handshake, RetryPolicy::fixed(3, 500.millis()));

    let result = socket.begin(&AtomicBool::new(false));
    assert_eq!(
        Err(Error::Exhausted {
            stage: Stage::Handshake,
            last: WifiError::Timeout
        }),
        result
    );
    assert_eq!(SocketState::Disconnected, socket.state());
    assert_eq!(None, socket.mac());
}

#[test]
fn test_begin_mode_failure_is_retried() {
    let mut device = MockDevice::new();
    device.expect_reset().times(2).returning(|| Ok(()));
    device.expect_test().times(2).returning(|| Ok(()));

    let mut attempts = 0;
    device.expect_set_mode().times(2).returning(move |_| {
        attempts += 1;
        if attempts == 1 {
            Err(WifiError::ProtocolFail)
        } else {
            Ok(())
        }
    });
    device.expect_delay().times(1).returning(|_| Ok(()));
    device.expect_local_mac().times(1).returning(|| Err(WifiError::Timeout));

    let mut socket = Socket::new(device, SocketOptions::default());
    socket.begin(&AtomicBool::new(false)).unwrap();

    // Missing MAC is not fatal
    assert_eq!(None, socket.mac());
}

#[test]
fn test_begin_cancelled_before_first_attempt() {
    let cancel = AtomicBool::new(true);
    let mut socket = Socket::new(MockDevice::new(), SocketOptions::default());

    assert_eq!(Err(Error::Cancelled), socket.begin(&cancel));
    assert_eq!(SocketState::Disconnected, socket.state());
}

#[test]
fn test_begin_cancelled_during_backoff() {
    static CANCEL: AtomicBool = AtomicBool::new(false);

    let mut device = MockDevice::new();
    device.expect_reset().times(1).returning(|| Ok(()));
    device.expect_test().times(1).returning(|| Err(WifiError::Timeout));
    device.expect_delay().times(1).returning(|_| {
        CANCEL.store(true, Ordering::Relaxed);
        Ok(())
    });

    let mut socket = Socket::new(device, SocketOptions::default());
    assert_eq!(Err(Error::Cancelled), socket.begin(&CANCEL));
}

#[test]
fn test_delay_failure_aborts_retry() {
    let mut device = MockDevice::new();
    device.expect_reset().times(1).returning(|| Ok(()));
    device.expect_test().times(1).returning(|| Err(WifiError::Timeout));
    device.expect_delay().times(1).returning(|_| Err(WifiError::TimerError));

    let mut socket = Socket::new(device, SocketOptions::default());
    assert_eq!(
        Err(Error::Device(WifiError::TimerError)),
        socket.begin(&AtomicBool::new(false))
    );
}

#[test]
fn test_open_client() {
    let mut device = joined_device();
    device
        .expect_set_multiplexing()
        .times(1)
        .withf(|enabled| *enabled)
        .returning(|_| Ok(()));
    device.expect_claim_link().times(1).returning(|| Some(2));
    device
        .expect_connect()
        .times(1)
        .returning(|link_id, _, port, keep_alive_ms| {
            assert_eq!(2, link_id);
            assert_eq!(21, port);
            assert_eq!(60_000, keep_alive_ms);
            Ok(ConnectOutcome::Connected)
        });

    let options = SocketOptions {
        keep_alive_ms: 60_000,
        ..SocketOptions::default()
    };

    let mut socket = Socket::new(device, options);
    socket
        .open("test_wifi", "secret", "10.0.0.1", 21, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(SocketState::ClientReady, socket.state());
    assert_eq!(Some(2), socket.link_id());
    assert!(socket.is_connected());
    assert_eq!(Some(Ipv4Addr::new(10, 0, 0, 181)), socket.local_ip());
    assert_eq!(Some(MAC), socket.mac());
}

#[test]
fn test_open_client_already_connected() {
    let mut device = joined_device();
    device
        .expect_set_multiplexing()
        .times(1)
        .withf(|enabled| !*enabled)
        .returning(|_| Ok(()));
    device.expect_claim_link().times(1).returning(|| Some(0));
    device
        .expect_connect()
        .times(1)
        .returning(|_, _, _, _| Ok(ConnectOutcome::AlreadyConnected));

    let options = SocketOptions {
        multiplexing: false,
        ..SocketOptions::default()
    };

    let mut socket = Socket::new(device, options);
    socket
        .open("test_wifi", "secret", "10.0.0.1", 21, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(SocketState::ClientReady, socket.state());
}

#[test]
fn test_open_client_connect_backoff() {
    let mut device = joined_device();
    device.expect_set_multiplexing().times(1).returning(|_| Ok(()));
    device.expect_claim_link().times(1).returning(|| Some(0));

    let mut attempts = 0;
    device.expect_connect().times(4).returning(move |_, _, _, _| {
        attempts += 1;
        if attempts < 4 {
            Err(WifiError::Timeout)
        } else {
            Ok(ConnectOutcome::Connected)
        }
    });

    let mut delays = vec![1_000u32, 2_000, 4_000].into_iter();
    device.expect_delay().times(3).returning(move |duration| {
        assert_eq!(delays.next(), Some(duration.to_millis()));
        Ok(())
    });

    let mut socket = Socket::new(device, SocketOptions::default());
    socket
        .open("test_wifi", "secret", "10.0.0.1", 21, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(SocketState::ClientReady, socket.state());
}

#[test]
fn test_open_client_connect_exhausted_releases_link() {
    let mut device = joined_device();
    device.expect_set_multiplexing().times(1).returning(|_| Ok(()));
    device.expect_claim_link().times(1).returning(|| Some(1));
    device
        .expect_connect()
        .times(2)
        .returning(|_, _, _, _| Err(WifiError::ProtocolFail));
    device.expect_delay().times(1).returning(|_| Ok(()));
    device
        .expect_release_link()
        .times(1)
        .withf(|link_id| *link_id == 1)
        .return_const(());

    let mut socket = Socket::new(device, SocketOptions::default());
    socket.set_retry_policy(Stage::Connect, RetryPolicy::fixed(2, 100.millis()));

    let result = socket.open("test_wifi", "secret", "10.0.0.1", 21, &AtomicBool::new(false));
    assert_eq!(
        Err(Error::Exhausted {
            stage: Stage::Connect,
            last: WifiError::ProtocolFail
        }),
        result
    );

    assert_eq!(SocketState::Disconnected, socket.state());
    assert_eq!(None, socket.link_id());
    assert!(!socket.is_connected());
}

#[test]
fn test_open_client_no_link_available() {
    let mut device = joined_device();
    device.expect_set_multiplexing().times(1).returning(|_| Ok(()));
    device.expect_claim_link().times(1).returning(|| None);

    let mut socket = Socket::new(device, SocketOptions::default());
    let result = socket.open("test_wifi", "secret", "10.0.0.1", 21, &AtomicBool::new(false));

    assert_eq!(Err(Error::NoLinkAvailable), result);
    assert_eq!(SocketState::Disconnected, socket.state());
}

#[test]
fn test_open_join_exhausted() {
    let mut device = handshaken_device();
    device
        .expect_join()
        .times(2)
        .returning(|_, _| Err(WifiError::ProtocolFail));
    device.expect_delay().times(1).returning(|duration| {
        assert_eq!(5_000, duration.to_millis());
        Ok(())
    });

    let mut socket = Socket::new(device, SocketOptions::default());
    socket.set_retry_policy(Stage::Join, RetryPolicy::fixed(2, 5_000.millis()));

    let result = socket.open("test_wifi", "wrong", "10.0.0.1", 21, &AtomicBool::new(false));
    assert_eq!(
        Err(Error::Exhausted {
            stage: Stage::Join,
            last: WifiError::ProtocolFail
        }),
        result
    );
    assert_eq!(SocketState::Disconnected, socket.state());
    assert_eq!(None, socket.local_ip());
}

#[test]
fn test_open_server() {
    let mut device = joined_device();
    let mut sequence = Sequence::new();

    device
        .expect_set_multiplexing()
        .times(1)
        .withf(|enabled| !*enabled)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    device
        .expect_set_transfer_mode()
        .times(1)
        .withf(|transparent| !*transparent)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    device
        .expect_set_multiplexing()
        .times(1)
        .withf(|enabled| *enabled)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    device
        .expect_configure_server()
        .times(1)
        .withf(|port, create| *port == 333 && *create)
        .in_sequence(&mut sequence)
        .returning(|_, _| Ok(()));

    let options = SocketOptions {
        role: Role::Server,
        multiplexing: false,
        ..SocketOptions::default()
    };

    let cancel = AtomicBool::new(false);
    let mut socket = Socket::new(device, options);

    // Handshake is not repeated by open()
    socket.begin(&cancel).unwrap();
    socket.open("test_wifi", "secret", "", 333, &cancel).unwrap();

    assert_eq!(SocketState::ServerReady, socket.state());
    assert_eq!(None, socket.link_id());
    assert!(!socket.is_connected());
}

#[test]
fn test_open_twice_keeps_link() {
    let mut socket = client_socket();

    let result = socket.open("test_wifi", "secret", "10.0.0.2", 80, &AtomicBool::new(false));

    assert_eq!(Err(Error::InvalidState), result);
    assert_eq!(SocketState::ClientReady, socket.state());
    assert_eq!(Some(0), socket.link_id());
    assert!(socket.is_connected());
}

#[test]
fn test_open_twice_in_server_role() {
    let mut socket = server_socket();

    let result = socket.open("test_wifi", "secret", "", 333, &AtomicBool::new(false));

    assert_eq!(Err(Error::InvalidState), result);
    assert_eq!(SocketState::ServerReady, socket.state());
}

#[test]
fn test_reopen_after_close() {
    let mut socket = client_socket();
    socket.device().expect_close().times(1).returning(|_| Ok(()));
    socket.device().expect_release_link().times(1).return_const(());
    socket.close().unwrap();
    socket.device().checkpoint();

    socket.device().expect_test().returning(|| Ok(()));
    socket.device().expect_join().times(1).returning(|_, _| Ok(()));
    socket
        .device()
        .expect_local_ip()
        .times(1)
        .returning(|| Ok(Ipv4Addr::new(10, 0, 0, 181)));
    socket.device().expect_set_multiplexing().times(1).returning(|_| Ok(()));
    socket.device().expect_claim_link().times(1).returning(|| Some(0));
    socket
        .device()
        .expect_connect()
        .times(1)
        .returning(|_, _, _, _| Ok(ConnectOutcome::Connected));

    socket
        .open("test_wifi", "secret", "10.0.0.2", 80, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(SocketState::ClientReady, socket.state());
}

#[test]
fn test_open_server_bind_failure() {
    let mut device = joined_device();
    device.expect_set_multiplexing().times(2).returning(|_| Ok(()));
    device.expect_set_transfer_mode().times(1).returning(|_| Ok(()));
    device
        .expect_configure_server()
        .times(1)
        .returning(|_, _| Err(WifiError::ProtocolFail));

    let options = SocketOptions {
        role: Role::Server,
        ..SocketOptions::default()
    };

    let mut socket = Socket::new(device, options);
    let result = socket.open("test_wifi", "secret", "", 333, &AtomicBool::new(false));

    assert_eq!(Err(Error::Device(WifiError::ProtocolFail)), result);
    assert_eq!(SocketState::Disconnected, socket.state());
}

#[test]
fn test_accept_adopts_free_server_link() {
    let mut socket = server_socket();

    let mut status = RadioStatus {
        connectivity: Connectivity::Connected,
        ..RadioStatus::default()
    };
    status.links[0] = link(0, Role::Client);
    status.links[2] = link(2, Role::Server);
    status.links[3] = link(3, Role::Server);

    socket.device().expect_refresh_status().times(1).returning(move || Ok(status));
    socket.device().expect_take_link().times(2).returning(|link_id| link_id == 3);

    assert_eq!(Ok(Some(3)), socket.accept());
    assert_eq!(Some(3), socket.link_id());
    assert!(socket.is_connected());
    assert_eq!(SocketState::ServerReady, socket.state());

    socket.device().expect_send().times(1).returning(|link_id, data| {
        assert_eq!(3, link_id);
        Ok(data.len())
    });
    assert_eq!(Ok(5), socket.write(b"hello"));
}

#[test]
fn test_accept_without_clients() {
    let mut socket = server_socket();

    let mut status = RadioStatus::default();
    status.links[1] = link(1, Role::Client);

    socket.device().expect_refresh_status().times(1).returning(move || Ok(status));

    assert_eq!(Ok(None), socket.accept());
    assert!(!socket.is_connected());
}

#[test]
fn test_accept_requires_server() {
    let mut socket = client_socket();
    assert_eq!(Err(Error::InvalidState), socket.accept());

    let mut socket = Socket::new(MockDevice::new(), SocketOptions::default());
    assert_eq!(Err(Error::InvalidState), socket.accept());
}

#[test]
fn test_write_caps_payload() {
    let mut socket = client_socket();
    socket.device().expect_send().times(1).returning(|link_id, data| {
        assert_eq!(0, link_id);
        assert_eq!(2048, data.len());
        Ok(data.len())
    });

    assert_eq!(Ok(2048), socket.write(&[0x1; 3000]));
}

#[test]
fn test_write_all_splits_payload() {
    let mut socket = client_socket();

    let mut lengths = vec![2048usize, 952].into_iter();
    socket.device().expect_send().times(2).returning(move |_, data| {
        assert_eq!(lengths.next(), Some(data.len()));
        Ok(data.len())
    });

    socket.write_all(&[0x1; 3000]).unwrap();
}

#[test]
fn test_write_send_error() {
    let mut socket = client_socket();
    socket
        .device()
        .expect_send()
        .times(1)
        .returning(|_, _| Err(WifiError::Timeout));

    assert_eq!(Err(Error::Device(WifiError::Timeout)), socket.write(b"hallo!"));
}

#[test]
fn test_write_not_connected() {
    let mut socket = Socket::new(MockDevice::new(), SocketOptions::default());

    assert_eq!(Ok(0), socket.write(b""));

    let error = socket.write(b"hallo!").unwrap_err();
    assert_eq!(Error::NotConnected, error);
    assert_eq!(ErrorKind::NotConnected, error.kind());
}

#[test]
fn test_close_is_optimistic() {
    let mut socket = client_socket();
    socket
        .device()
        .expect_close()
        .times(1)
        .withf(|link_id| *link_id == 0)
        .returning(|_| Err(WifiError::ProtocolFail));
    socket
        .device()
        .expect_release_link()
        .times(1)
        .withf(|link_id| *link_id == 0)
        .return_const(());

    assert_eq!(Err(Error::Device(WifiError::ProtocolFail)), socket.close());
    assert!(!socket.is_connected());
    assert_eq!(None, socket.link_id());
    assert_eq!(SocketState::Disconnected, socket.state());
    assert_eq!(Err(Error::NotConnected), socket.write(b"hallo!"));

    // No link left to close
    assert_eq!(Ok(()), socket.close());
}

#[test]
fn test_close_server_link_keeps_listening() {
    let mut socket = server_socket();

    let mut status = RadioStatus::default();
    status.links[4] = link(4, Role::Server);

    socket.device().expect_refresh_status().times(1).returning(move || Ok(status));
    socket.device().expect_take_link().times(1).returning(|_| true);
    socket.device().expect_close().times(1).returning(|_| Ok(()));
    socket.device().expect_release_link().times(1).return_const(());

    assert_eq!(Ok(Some(4)), socket.accept());
    assert_eq!(Ok(()), socket.close());
    assert_eq!(SocketState::ServerReady, socket.state());
}

#[test]
fn test_error_kinds() {
    let exhausted = Error::Exhausted {
        stage: Stage::Connect,
        last: WifiError::Timeout,
    };

    assert_eq!(ErrorKind::TimedOut, exhausted.kind());
    assert_eq!(ErrorKind::Interrupted, Error::<WifiError>::Cancelled.kind());
    assert_eq!(ErrorKind::InvalidInput, Error::<WifiError>::InvalidState.kind());
    assert_eq!(ErrorKind::Other, Error::Device(WifiError::Unknown).kind());
    assert_eq!(ErrorKind::Other, Error::<WifiError>::NoLinkAvailable.kind());
}
