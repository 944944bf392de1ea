//! In-memory gateway and failing generator for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::RngCore;

use crate::store::model::now;
use crate::store::{Secret, StoreError, StoreGateway};

/// Records every call it receives and can be told to fail per operation.
#[derive(Default)]
pub(crate) struct CountingGateway {
    records: Mutex<HashMap<String, Secret>>,
    puts: AtomicUsize,
    queries: AtomicUsize,
    deletes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_queries: AtomicBool,
    fail_deletes: AtomicBool,
}

impl CountingGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.puts() + self.queries() + self.deletes()
    }

    pub(crate) fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Write a record without counting the call.
    pub(crate) fn seed(&self, secret: Secret) {
        self.records
            .lock()
            .unwrap()
            .insert(secret.id.clone(), secret);
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.records.lock().unwrap().contains_key(id)
    }
}

impl StoreGateway for CountingGateway {
    fn put(&self, secret: &Secret) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("put refused".into()));
        }
        self.records
            .lock()
            .unwrap()
            .insert(secret.id.clone(), secret.clone());
        Ok(())
    }

    fn query(&self, id: &str) -> Result<Vec<Secret>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("query refused".into()));
        }
        let now = now();
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(id)
            .filter(|s| !s.is_expired(now))
            .cloned()
            .into_iter()
            .collect())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("delete refused".into()));
        }
        self.records.lock().unwrap().remove(id);
        Ok(())
    }
}

/// An entropy source that is always exhausted.
pub(crate) struct FailingRng;

impl RngCore for FailingRng {
    fn next_u32(&mut self) -> u32 {
        unreachable!("identifier generation must use try_fill_bytes")
    }

    fn next_u64(&mut self) -> u64 {
        unreachable!("identifier generation must use try_fill_bytes")
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        unreachable!("identifier generation must use try_fill_bytes")
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new("entropy source exhausted"))
    }
}
