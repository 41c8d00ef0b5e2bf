use crate::error::StorageError;
use crate::models::GatewayConfigDocument;
use crate::traits::ConfigStore;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryConfigStore {
    document: RwLock<GatewayConfigDocument>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: GatewayConfigDocument) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }
}

#[async_trait::async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self) -> Result<GatewayConfigDocument, StorageError> {
        let document = self
            .document
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(document.clone())
    }

    async fn save(&self, document: &GatewayConfigDocument) -> Result<(), StorageError> {
        let mut current = self
            .document
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        *current = document.clone();
        Ok(())
    }
}
