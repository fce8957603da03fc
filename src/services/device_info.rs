//! Device information service (`device-info`).

use std::sync::Arc;

use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::adapters::device_id::{device_id, format_mac, hostname};
use crate::config::DaemonConfig;
use crate::error::ServiceError;
use crate::rpc::message::RpcError;
use crate::rpc::registry::RpcMethod;
use crate::rpc::service::{Notifier, RpcService};

pub const SERVICE_NAME: &str = "device-info";
pub const METHOD_GET: &str = "dev-info-get";

/// Identity reported to the provisioning client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub hostname: String,
    pub model: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub mac: String,
    pub firmware_version: String,
}

impl DeviceInfo {
    pub fn from_config(config: &DaemonConfig) -> Result<Self, ServiceError> {
        let mac = config.mac_bytes().ok_or_else(|| ServiceError::Init {
            service: SERVICE_NAME.into(),
            reason: format!("unparsable MAC `{}`", config.device.mac),
        })?;
        let id = device_id(&mac);
        let serial_number = if config.device.serial_number.is_empty() {
            id.to_string()
        } else {
            config.device.serial_number.clone()
        };
        Ok(Self {
            device_id: id.to_string(),
            hostname: hostname(&mac).to_string(),
            model: config.device.model.clone(),
            manufacturer: config.device.manufacturer.clone(),
            serial_number,
            mac: format_mac(&mac).to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
        })
    }
}

#[derive(Default)]
pub struct DeviceInfoService {
    info: Option<Arc<Value>>,
}

impl DeviceInfoService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RpcService for DeviceInfoService {
    fn init(&mut self, config: &DaemonConfig, _notifier: Notifier) -> Result<(), ServiceError> {
        let info = DeviceInfo::from_config(config)?;
        info!("RPC: device {} ({})", info.device_id, info.hostname);
        let value = serde_json::to_value(&info).map_err(|e| ServiceError::Init {
            service: SERVICE_NAME.into(),
            reason: e.to_string(),
        })?;
        self.info = Some(Arc::new(value));
        Ok(())
    }

    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn method_names(&self) -> Vec<String> {
        vec![METHOD_GET.to_owned()]
    }

    fn method(&self, name: &str) -> Option<RpcMethod> {
        if name != METHOD_GET {
            return None;
        }
        let info = Arc::clone(self.info.as_ref()?);
        Some(Arc::new(move |_: &Value| -> Result<Value, RpcError> { Ok((*info).clone()) }))
    }
}
