//! 设备注册表
//!
//! 保存每台设备的配置与实时状态（状态、最新数据、连续失败次数）。
//! 调度器是唯一的状态写入方；HTTP 与推送通道只读快照。

use crate::error::StorageError;
use domain::{Device, DeviceConfig};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增设备；ID 已存在时返回错误。
    pub fn insert(&self, config: DeviceConfig) -> Result<Device, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if devices.contains_key(&config.id) {
            return Err(StorageError::new(format!(
                "device already exists: {}",
                config.id
            )));
        }
        let device = Device::new(config);
        devices.insert(device.id().to_string(), device.clone());
        Ok(device)
    }

    /// 以新配置替换设备，实时状态重置。
    pub fn replace(&self, config: DeviceConfig) -> Result<Device, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let device = Device::new(config);
        devices.insert(device.id().to_string(), device.clone());
        Ok(device)
    }

    pub fn remove(&self, device_id: &str) -> Result<Option<Device>, StorageError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.remove(device_id))
    }

    pub fn get(&self, device_id: &str) -> Result<Option<Device>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.get(device_id).cloned())
    }

    /// 按 ID 排序返回全部设备快照。
    pub fn list(&self) -> Result<Vec<Device>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.values().cloned().collect())
    }

    pub fn configs(&self) -> Result<Vec<DeviceConfig>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.values().map(|device| device.config.clone()).collect())
    }

    /// 原地修改设备，返回修改后的快照；设备不存在时返回 None。
    pub fn update<F>(&self, device_id: &str, apply: F) -> Result<Option<Device>, StorageError>
    where
        F: FnOnce(&mut Device),
    {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(devices.get_mut(device_id).map(|device| {
            apply(device);
            device.clone()
        }))
    }
}
