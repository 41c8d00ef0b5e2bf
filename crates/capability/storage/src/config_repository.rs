//! 配置文档仓库
//!
//! 缓存当前配置文档，所有修改经 [`ConfigRepository::update`] 串行化后整体写回，
//! 设备、告警与历史记录器三处的并发修改不会互相覆盖。

use crate::error::StorageError;
use crate::models::GatewayConfigDocument;
use crate::traits::ConfigStore;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ConfigRepository {
    store: Arc<dyn ConfigStore>,
    document: Mutex<GatewayConfigDocument>,
}

impl ConfigRepository {
    /// 从存储加载初始文档。
    pub async fn load(store: Arc<dyn ConfigStore>) -> Result<Self, StorageError> {
        let document = store.load().await?;
        Ok(Self {
            store,
            document: Mutex::new(document),
        })
    }

    pub async fn snapshot(&self) -> GatewayConfigDocument {
        self.document.lock().await.clone()
    }

    /// 在文档副本上执行修改并保存；保存失败时缓存保持不变。
    pub async fn update<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut GatewayConfigDocument),
    {
        let mut guard = self.document.lock().await;
        let mut next = guard.clone();
        apply(&mut next);
        self.store.save(&next).await?;
        *guard = next;
        Ok(())
    }
}
