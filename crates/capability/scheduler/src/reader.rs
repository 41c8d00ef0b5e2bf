use domain::DeviceConfig;
use gateway_protocol::{AdapterError, DeviceAdapter, PointReader};
use std::sync::Arc;

/// 设备创建时构造读点能力；配置非法时返回 `InvalidConfig`。
pub trait ReaderFactory: Send + Sync {
    fn create(&self, config: &DeviceConfig) -> Result<Arc<dyn PointReader>, AdapterError>;
}

/// 按设备协议构造真实适配器。
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtocolReaderFactory;

impl ReaderFactory for ProtocolReaderFactory {
    fn create(&self, config: &DeviceConfig) -> Result<Arc<dyn PointReader>, AdapterError> {
        let adapter = DeviceAdapter::from_config(config)?;
        Ok(Arc::new(adapter))
    }
}
