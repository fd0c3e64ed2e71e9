use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::debug;

use crate::client::{DeviceFound, Peripheral};
use crate::definitions::Value;
use crate::error::DecodeError;
use crate::shade::advertisement::{
    SHADE_MANUFACTURER_ID, ShadeAdvertisement, scale_position, unscale_position,
};
use crate::shade::commands::{Ack, MotorCommand, Toggle};
use crate::shade::configuration::{ConfigTag, ShadeConfiguration, query};
use crate::shade::trigger::{Trigger, TriggerCommand, TriggerResponse};
use crate::{Error, Result};

const MOTOR: &str = "motor";
const SHADE: &str = "shade";

/// Motorised shade driven through a [`Peripheral`].
///
/// Clones share the tilt flag, which follows acknowledged venetian-mode
/// toggles.
#[derive(Debug, Clone)]
pub struct Shade {
    peripheral: Peripheral,
    supports_tilt: Arc<AtomicBool>,
}

impl Shade {
    pub fn new(peripheral: Peripheral, supports_tilt: bool) -> Self {
        Shade {
            peripheral,
            supports_tilt: Arc::new(AtomicBool::new(supports_tilt)),
        }
    }

    pub fn from_advertisement(peripheral: Peripheral, advertisement: &ShadeAdvertisement) -> Self {
        Self::new(peripheral, advertisement.supports_tilt)
    }

    /// Whether a discovery advertises under the shade manufacturer ID.
    pub fn matches(device: &DeviceFound) -> bool {
        device
            .manufacturer
            .is_some_and(|m| m.code == SHADE_MANUFACTURER_ID)
    }

    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    pub fn supports_tilt(&self) -> bool {
        self.supports_tilt.load(Ordering::Acquire)
    }

    async fn read_percent(&self, service: &str, characteristic: &str) -> Result<u8> {
        let reading = self.peripheral.read(service, characteristic).await?;
        reading
            .value
            .as_unsigned()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| {
                DecodeError::invalid("percent", format!("{:?}", reading.value)).into()
            })
    }

    pub async fn position(&self) -> Result<i16> {
        let raw = self.read_percent(MOTOR, "position").await?;
        Ok(scale_position(raw, self.supports_tilt()))
    }

    pub async fn target_position(&self) -> Result<i16> {
        let raw = self.read_percent(MOTOR, "target_position").await?;
        Ok(scale_position(raw, self.supports_tilt()))
    }

    pub async fn set_target_position(&self, position: i16) -> Result<()> {
        let raw = unscale_position(position, self.supports_tilt())
            .map_err(|_| Error::InvalidValue(format!("position {position} out of range")))?;
        self.peripheral
            .write_value(MOTOR, "target_position", &Value::Unsigned(raw.into()))
            .await
    }

    pub async fn command(&self, command: MotorCommand) -> Result<()> {
        debug!("{} motor {command:?}", self.peripheral.id());
        self.peripheral
            .write(MOTOR, "motor_control", &[command.byte()], false)
            .await
    }

    pub async fn move_up(&self) -> Result<()> {
        self.command(MotorCommand::Up).await
    }

    pub async fn move_down(&self) -> Result<()> {
        self.command(MotorCommand::Down).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.command(MotorCommand::Stop).await
    }

    pub async fn battery(&self) -> Result<u8> {
        self.read_percent("battery", "battery_level").await
    }

    pub async fn name(&self) -> Result<String> {
        let reading = self.peripheral.read(SHADE, "name").await?;
        match reading.value {
            Value::Text(name) => Ok(name),
            other => Err(DecodeError::invalid("name", format!("{other:?}")).into()),
        }
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.peripheral
            .write_value(SHADE, "name", &Value::Text(name.to_string()))
            .await
    }

    async fn trigger_exchange(&self, command: TriggerCommand) -> Result<TriggerResponse> {
        let operation = format!("trigger {command:?}");
        let reply = self
            .peripheral
            .exchange(MOTOR, "trigger_control", "trigger_response", &command.encode())
            .await?;
        let response = TriggerResponse::decode(&reply.data)?;
        if response.opcode != command.opcode() {
            return Err(DecodeError::invalid(
                "trigger reply",
                format!("opcode {:#04x} for {operation}", response.opcode),
            )
            .into());
        }
        if !response.is_ok() {
            return Err(Error::Rejected {
                operation,
                status: response.status,
            });
        }
        Ok(response)
    }

    pub async fn read_trigger(&self, id: u8) -> Result<Trigger> {
        let response = self.trigger_exchange(TriggerCommand::Read(id)).await?;
        response
            .trigger
            .ok_or_else(|| DecodeError::invalid("trigger reply", "missing record").into())
    }

    pub async fn add_trigger(&self, trigger: Trigger) -> Result<()> {
        self.trigger_exchange(TriggerCommand::Add(trigger)).await?;
        Ok(())
    }

    pub async fn edit_trigger(&self, trigger: Trigger) -> Result<()> {
        self.trigger_exchange(TriggerCommand::Edit(trigger)).await?;
        Ok(())
    }

    pub async fn remove_trigger(&self, id: u8) -> Result<()> {
        self.trigger_exchange(TriggerCommand::Remove(id)).await?;
        Ok(())
    }

    /// Ask for `tags`, or everything when empty.
    pub async fn query_configuration(&self, tags: &[ConfigTag]) -> Result<ShadeConfiguration> {
        let reply = self
            .peripheral
            .exchange(SHADE, "configuration", "configuration_response", &query(tags))
            .await?;
        let configuration = ShadeConfiguration::decode(&reply.data)?;
        if configuration.status != 0 {
            return Err(Error::Rejected {
                operation: "configuration query".to_string(),
                status: configuration.status,
            });
        }
        Ok(configuration)
    }

    async fn toggle(&self, toggle: Toggle, operation: &str) -> Result<()> {
        let reply = self
            .peripheral
            .exchange(SHADE, "configuration", "configuration_response", &toggle.encode())
            .await?;
        Ack::decode(&reply.data)?.check(toggle.opcode(), operation)
    }

    pub async fn set_calibration(&self, on: bool) -> Result<()> {
        self.toggle(Toggle::Calibration(on), "calibration").await
    }

    /// Switch venetian mode. Once acknowledged, positions use the tilt range.
    pub async fn set_venetian_mode(&self, on: bool) -> Result<()> {
        self.toggle(Toggle::VenetianMode(on), "venetian mode").await?;
        self.supports_tilt.store(on, Ordering::Release);
        debug!("{} venetian mode {on}", self.peripheral.id());
        Ok(())
    }

    /// Set the shade clock. `utc_offset_minutes` is the local offset east of UTC.
    pub async fn set_time(&self, now: DateTime<Utc>, utc_offset_minutes: i16) -> Result<()> {
        self.peripheral
            .write_value("time", "current_time", &Value::Timestamp(now))
            .await?;
        self.peripheral
            .write_value("time", "utc_offset", &Value::Signed(utc_offset_minutes.into()))
            .await
    }
}
