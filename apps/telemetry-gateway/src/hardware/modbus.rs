use super::ModbusBus;
use crate::config::{ModbusEndpoint, ModbusFraming};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_modbus::client::{rtu, tcp, Context};
use tokio_modbus::prelude::{Reader, SlaveContext};
use tokio_modbus::slave::Slave;

/// Shared bus connection, opened on first use and reopened after any failed transaction.
pub struct LazyModbusBus {
    endpoint: ModbusEndpoint,
    timeout: Duration,
    context: Mutex<Option<Context>>,
}

impl LazyModbusBus {
    pub fn new(endpoint: ModbusEndpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            context: Mutex::new(None),
        }
    }

    async fn connect(&self) -> io::Result<Context> {
        let address = self.endpoint.address();
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("modbus connect to {address} timed out"),
                )
            })??;
        stream.set_nodelay(true)?;
        tracing::info!(
            address = %address,
            framing = ?self.endpoint.framing,
            "modbus bus connected"
        );
        Ok(match self.endpoint.framing {
            ModbusFraming::RtuOverTcp => rtu::attach(stream),
            ModbusFraming::Tcp => tcp::attach(stream),
        })
    }
}

impl ModbusBus for LazyModbusBus {
    fn read_holding_registers(
        &self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> BoxFuture<'_, io::Result<Vec<u16>>> {
        async move {
            let mut guard = self.context.lock().await;
            if guard.is_none() {
                *guard = Some(self.connect().await?);
            }
            let Some(context) = guard.as_mut() else {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "modbus bus not connected",
                ));
            };

            context.set_slave(Slave(unit));
            let request = context.read_holding_registers(address, count);
            let result = match tokio::time::timeout(self.timeout, request).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("modbus unit {unit} did not answer within {:?}", self.timeout),
                    )),
                };

            if let Err(err) = &result {
                // a half-read frame leaves the stream out of sync; start over next time
                tracing::debug!(
                    unit,
                    address,
                    error = %err,
                    "modbus transaction failed; dropping connection"
                );
                *guard = None;
            }
            result
        }
        .boxed()
    }
}
