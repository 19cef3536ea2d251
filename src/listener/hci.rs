//! Raw HCI socket backend for sensor advertisements.
//!
//! Reads LE advertising reports straight from a Linux HCI socket, without the
//! BlueZ daemon, and runs the whole advertising payload through
//! [`decode_advertisement`]. Needs CAP_NET_RAW and CAP_NET_ADMIN, or root.

use super::{
    ListenError, MEASUREMENT_CHANNEL_BUFFER_SIZE, MeasurementResult, decode_advertisement,
};
use crate::advertisement::find_manufacturer_data;
use crate::manufacturer::COMPANY_ID;
use crate::origin::MacAddress;
use crate::reader::Reader;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;
const HCI_DEV: u16 = 0;

const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;
const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

/// Packet type, event code, parameter length, LE subevent.
const LE_META_HEADER_LEN: usize = 4;

const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

const LE_SCAN_PASSIVE: u8 = 0x00;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;
/// 10 ms in 0.625 ms slots.
const SCAN_INTERVAL: u16 = 0x0010;
const SCAN_WINDOW: u16 = 0x0010;

/// Largest HCI event: 3-byte header plus 255 parameter bytes.
const MAX_EVENT_SIZE: usize = 258;

#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// Kernel-side event filter for raw HCI sockets.
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn le_meta_events() -> Self {
        let mut filter = Self {
            type_mask: 0,
            event_mask: [0; 2],
            opcode: 0,
        };
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

fn os_error(action: &str) -> ListenError {
    ListenError::Bluetooth(format!("{action}: {}", io::Error::last_os_error()))
}

fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// LE Set Scan Parameters: passive scan, accept every advertiser.
fn scan_parameters() -> [u8; 7] {
    let [interval_lo, interval_hi] = SCAN_INTERVAL.to_le_bytes();
    let [window_lo, window_hi] = SCAN_WINDOW.to_le_bytes();
    [
        LE_SCAN_PASSIVE,
        interval_lo,
        interval_hi,
        window_lo,
        window_hi,
        LE_PUBLIC_ADDRESS,
        FILTER_POLICY_ACCEPT_ALL,
    ]
}

/// Open a non-blocking raw HCI socket bound to `dev_id`.
fn open_hci_socket(dev_id: u16) -> Result<OwnedFd, ListenError> {
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };
    if fd < 0 {
        return Err(os_error("failed to create HCI socket"));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: HCI_CHANNEL_RAW,
    };
    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };
    if ret < 0 {
        return Err(os_error("failed to bind HCI socket"));
    }

    Ok(fd)
}

fn set_le_meta_filter(fd: &OwnedFd) -> Result<(), ListenError> {
    let filter = HciFilter::le_meta_events();
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            SOL_HCI,
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };
    if ret < 0 {
        return Err(os_error("failed to set HCI filter"));
    }
    Ok(())
}

fn send_hci_command(fd: &OwnedFd, ocf: u16, params: &[u8]) -> Result<(), ListenError> {
    let packet = hci_command_packet(OGF_LE_CTL, ocf, params);
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };
    if ret < 0 {
        return Err(os_error("failed to send HCI command"));
    }
    Ok(())
}

fn enable_le_scan(fd: &OwnedFd) -> Result<(), ListenError> {
    send_hci_command(fd, OCF_LE_SET_SCAN_PARAMETERS, &scan_parameters())?;
    // enable, no duplicate filtering
    send_hci_command(fd, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00])
}

/// Decode the first report of an LE advertising report event.
///
/// Returns `None` for events that are not advertising reports and for
/// advertisers that do not carry the sensor's company id.
fn parse_advertising_report(event: &[u8]) -> Option<MeasurementResult> {
    let (header, params) = event.split_at_checked(LE_META_HEADER_LEN)?;
    if header[0] != HCI_EVENT_PKT
        || header[1] != EVT_LE_META_EVENT
        || header[3] != EVT_LE_ADVERTISING_REPORT
    {
        return None;
    }

    let mut reader = Reader::new(params);
    if reader.read_u8().ok()? == 0 {
        return None;
    }
    // event type, address type
    reader.skip(2).ok()?;
    let mut addr: [u8; 6] = reader.take(6).ok()?.try_into().ok()?;
    addr.reverse();
    let ad_data = reader.read_length_prefixed().ok()?;

    let manufacturer = find_manufacturer_data(ad_data)?;
    if !manufacturer.starts_with(&COMPANY_ID.to_le_bytes()) {
        return None;
    }

    Some(decode_advertisement(MacAddress(addr), ad_data))
}

fn read_event(fd: &OwnedFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Start a passive LE scan on `hci0` and decode sensor advertisements.
///
/// # Arguments
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
///
/// # Returns
/// A receiver for measurements (or decode errors if verbose).
pub async fn start(verbose: bool) -> Result<mpsc::Receiver<MeasurementResult>, ListenError> {
    let event_fd = open_hci_socket(HCI_DEV)?;
    set_le_meta_filter(&event_fd)?;

    let cmd_fd = open_hci_socket(HCI_DEV)?;
    enable_le_scan(&cmd_fd)?;

    let async_fd = AsyncFd::new(event_fd)?;
    info!(device = HCI_DEV, "scanning for BLE advertisements over raw HCI");

    let (tx, rx) = mpsc::channel(MEASUREMENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        // Scanning stays enabled while the command socket is open.
        let _cmd_fd = cmd_fd;
        let mut buf = [0u8; MAX_EVENT_SIZE];

        'events: loop {
            let ready = tokio::select! {
                _ = tx.closed() => break,
                ready = async_fd.readable() => ready,
            };
            let mut guard = match ready {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(error = %e, "HCI socket failed");
                    break;
                }
            };

            // Drain everything queued before waiting again.
            loop {
                let n = match guard.try_io(|inner| read_event(inner.get_ref(), &mut buf)) {
                    Ok(Ok(0)) | Err(_) => break,
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => {
                        warn!(error = %e, "HCI read failed");
                        break 'events;
                    }
                };
                let Some(result) = parse_advertising_report(&buf[..n]) else {
                    continue;
                };
                if (result.is_ok() || verbose) && tx.send(result).await.is_err() {
                    break 'events;
                }
            }
        }
        debug!("HCI event loop stopped");
    });

    Ok(rx)
}
