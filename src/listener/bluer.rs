//! BlueZ D-Bus backend for sensor advertisements.
//!
//! Uses the `bluer` crate to talk to the BlueZ daemon, so `bluetoothd` must be
//! running. BlueZ hands out manufacturer data already split by company id;
//! the id is put back in front before decoding.

use super::{
    ListenError, MEASUREMENT_CHANNEL_BUFFER_SIZE, MeasurementResult, decode_manufacturer_data,
};
use crate::advertisement::MANUFACTURER_DATA_TYPE;
use crate::manufacturer::COMPANY_ID;
use crate::origin::MacAddress;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

impl From<bluer::Error> for ListenError {
    fn from(err: bluer::Error) -> Self {
        ListenError::Bluetooth(err.to_string())
    }
}

/// Start a passive scan for sensor advertisements on the default adapter.
///
/// # Arguments
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
///
/// # Returns
/// A receiver for measurements (or decode errors if verbose).
pub async fn start(verbose: bool) -> Result<mpsc::Receiver<MeasurementResult>, ListenError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    info!(adapter = adapter.name(), "scanning for BLE advertisements");

    let (tx, rx) = mpsc::channel(MEASUREMENT_CHANNEL_BUFFER_SIZE);

    let pattern = Pattern {
        data_type: MANUFACTURER_DATA_TYPE,
        start_position: 0,
        content: COMPANY_ID.to_le_bytes().to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    tokio::spawn(async move {
        // Dropping the session or manager unregisters the monitor.
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            if let MonitorEvent::DeviceFound(device_id) = event
                && let Err(e) = process_device(&adapter, device_id.device, &tx, verbose).await
            {
                warn!(device = %device_id.device, error = %e, "failed to read device");
            }
            if tx.is_closed() {
                break;
            }
        }
    });

    Ok(rx)
}

async fn process_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<MeasurementResult>,
    verbose: bool,
) -> Result<(), ListenError> {
    let device = adapter.device(address)?;

    let Some(manufacturer_data) = device.manufacturer_data().await? else {
        return Ok(());
    };
    let Some(payload) = manufacturer_data.get(&COMPANY_ID) else {
        return Ok(());
    };

    let result = decode_manufacturer_data(MacAddress::from(address), &with_company_id(payload));
    if result.is_ok() || verbose {
        let _ = tx.send(result).await;
    }

    Ok(())
}

/// Rebuild the raw manufacturer-specific data field from BlueZ's per-company payload.
fn with_company_id(payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + 2);
    data.extend_from_slice(&COMPANY_ID.to_le_bytes());
    data.extend_from_slice(payload);
    data
}
