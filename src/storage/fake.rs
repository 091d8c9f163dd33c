// clickvault/src/storage/fake.rs
//! In-memory blob store for engine and catalog tests: objects live in a map,
//! every fetch and delete is recorded.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;

use crate::storage::BlobStore;

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub gets: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, name: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get_count(&self) -> usize {
        self.gets.lock().unwrap().len()
    }
}

impl BlobStore for FakeStore {
    async fn put(&self, file_path: &Path, name: &str) -> Result<()> {
        let bytes = std::fs::read(file_path)?;
        self.objects.lock().unwrap().insert(name.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, name: &str, destination: &Path) -> Result<()> {
        self.gets.lock().unwrap().push(name.to_string());
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such object: {name}"))?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, bytes)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.names())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(name))
    }
}
