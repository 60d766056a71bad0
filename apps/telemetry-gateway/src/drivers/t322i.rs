use super::registers::{self, DataType, RegisterPoint};
use super::{jitter, DeviceLink};
use crate::node::{ReadError, Sensor};
use crate::units::{CurrentUnit, NativeUnit, Quantity};
use std::sync::Arc;

pub const CHANNEL_COUNT: u8 = 12;

const SERIAL_NUMBER: RegisterPoint = RegisterPoint {
    metric: "serial_number",
    register: 1,
    data_type: DataType::U32,
    scale: 1.0,
    unit: NativeUnit::Scalar,
};

/// Channel `n` reports milliamps as a float at register `CURRENT_BASE + 2 * (n - 1)`.
const CURRENT_BASE: u16 = 101;

fn channel_point(channel: u8) -> RegisterPoint {
    RegisterPoint {
        metric: "loop_current",
        register: CURRENT_BASE + 2 * (channel as u16 - 1),
        data_type: DataType::F32Be,
        scale: 1.0,
        unit: NativeUnit::Current(CurrentUnit::Milliamps),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("T3-22i has no channel {0}")]
    NoSuchChannel(u8),
    #[error("failed to open channel {channel}: {source}")]
    Open { channel: u8, source: ReadError },
}

pub struct T322i {
    link: DeviceLink,
}

impl T322i {
    pub fn new(link: DeviceLink) -> Self {
        Self { link }
    }

    pub async fn read_serial_number(&self) -> Result<String, ReadError> {
        let serial = match &self.link {
            DeviceLink::Simulated => 0x5322_0001u32 as f64,
            DeviceLink::Modbus { bus, unit } => {
                registers::read_point(bus.as_ref(), *unit, &SERIAL_NUMBER).await?
            }
        };
        Ok(format!("{:08X}", serial as u32))
    }

    /// Opens a current input on `channel`, probing it once so a module that is still booting
    /// or losing bus arbitration reports failure here instead of on every scheduled read.
    pub async fn open_current_input(
        self: &Arc<Self>,
        channel: u8,
    ) -> Result<CurrentInput, ChannelError> {
        if channel == 0 || channel > CHANNEL_COUNT {
            return Err(ChannelError::NoSuchChannel(channel));
        }
        let input = CurrentInput {
            module: self.clone(),
            channel,
        };
        if !self.link.is_simulated() {
            input
                .read()
                .await
                .map_err(|source| ChannelError::Open { channel, source })?;
        }
        Ok(input)
    }
}

impl Sensor for T322i {
    fn kind(&self) -> &'static str {
        "t322i"
    }
}

#[derive(Clone)]
pub struct CurrentInput {
    module: Arc<T322i>,
    channel: u8,
}

impl CurrentInput {
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub async fn read(&self) -> Result<Quantity, ReadError> {
        self.module
            .link
            .read_point(&channel_point(self.channel), || jitter(12.0, 0.8))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::registers::testing::FakeBus;

    #[tokio::test]
    async fn reads_serial_and_channel_current() {
        let bus = Arc::new(FakeBus::default());
        bus.set(7, 0, &[0x0012, 0x3456]);
        bus.set_f32(7, channel_point(3).address(), 8.5);
        let module = Arc::new(T322i::new(DeviceLink::modbus(bus, 7)));

        assert_eq!(module.read_serial_number().await.unwrap(), "00123456");
        let input = module.open_current_input(3).await.unwrap();
        assert_eq!(input.read().await.unwrap(), Quantity::milliamps(8.5));
    }

    #[tokio::test]
    async fn rejects_channels_outside_module() {
        let module = Arc::new(T322i::new(DeviceLink::Simulated));
        assert!(matches!(
            module.open_current_input(0).await,
            Err(ChannelError::NoSuchChannel(0))
        ));
        assert!(matches!(
            module.open_current_input(CHANNEL_COUNT + 1).await,
            Err(ChannelError::NoSuchChannel(_))
        ));
        assert!(module.open_current_input(CHANNEL_COUNT).await.is_ok());
    }

    #[tokio::test]
    async fn open_fails_while_channel_does_not_answer() {
        let bus = Arc::new(FakeBus::default());
        let module = Arc::new(T322i::new(DeviceLink::modbus(bus.clone(), 7)));
        assert!(matches!(
            module.open_current_input(1).await,
            Err(ChannelError::Open { channel: 1, .. })
        ));
        bus.set_f32(7, channel_point(1).address(), 4.0);
        assert!(module.open_current_input(1).await.is_ok());
    }
}
