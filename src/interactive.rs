//! Interactive UART console.
//!
//! Connects to one device, prints its GATT layout, then forwards operator
//! lines to the RX characteristic while echoing everything the device sends
//! on TX. Nothing is parsed and no metrics are produced.

use std::io::Write;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::ble::transport::{BleConnection, BleTransport};
use crate::ble::uart::UartChannel;
use crate::error::Result;
use crate::utils::hex_upper;

/// Options for an interactive session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Time allowed to establish the connection.
    pub connect_timeout: Duration,
    /// How long to keep printing replies after input ends.
    pub linger: Duration,
}

/// Run a console session against `address`.
///
/// Lines are read from `input` until end of input; each non-empty line is
/// sent with its terminator normalised to `\n`. Output goes to `output`.
/// The connection is released before returning, including on error.
pub async fn run<R, W>(
    transport: &dyn BleTransport,
    address: &str,
    options: SessionOptions,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!("Connecting to {}", address);
    let connection = transport.connect(address, options.connect_timeout).await?;
    info!("Connected to {}", address);

    let result = session(connection.as_ref(), options.linger, input, output).await;

    if let Err(e) = connection.disconnect().await {
        warn!("Failed to disconnect from {}: {}", address, e);
    }
    result
}

async fn session<R, W>(
    connection: &dyn BleConnection,
    linger: Duration,
    input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let services = connection.discover_services(&[]).await?;
    for service in &services {
        writeln!(output, "service: {}", service)?;
        for characteristic in service.discover_characteristics(&[]) {
            writeln!(output, "  characteristic: {}", characteristic.uuid)?;
        }
    }

    let uart = UartChannel::from_services(&services)?;
    let mut notifications = connection.subscribe(&uart.tx).await?.fuse();
    let mut lines = input.lines();

    loop {
        tokio::select! {
            Some(payload) = notifications.next() => {
                print_payload(output, &payload)?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                debug!("Sending {:?}", line);
                let mut data = Vec::with_capacity(line.len() + 1);
                data.extend_from_slice(line.as_bytes());
                data.push(b'\n');
                connection.write_without_response(&uart.rx, &data).await?;
            }
        }
    }

    debug!("Input closed, draining replies for {:?}", linger);
    let deadline = tokio::time::sleep(linger);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            payload = notifications.next() => match payload {
                Some(payload) => print_payload(output, &payload)?,
                None => break,
            },
        }
    }

    Ok(())
}

fn print_payload<W: Write>(output: &mut W, payload: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(payload);
    writeln!(
        output,
        "Got bytes from tx: {} {}",
        text.trim_end(),
        hex_upper(payload)
    )?;
    output.flush()?;
    Ok(())
}
