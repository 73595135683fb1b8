//! Test utilities for usb-bridge
//!
//! Provides a scriptable transport and frame recorders for exercising the
//! bridge without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockError, MockTransport, TransportCall};
//! use common::{HostEventEmitter, UsbBridge};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bridge = UsbBridge::new(MockTransport::new(), HostEventEmitter::new());
//! bridge.write(&[0x0a, 0xff]).await.unwrap();
//! assert_eq!(bridge.transport().calls(), vec![TransportCall::Write("0aff".into())]);
//! # }
//! ```

use crate::transport::NativeTransport;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a future with a timeout
pub async fn with_timeout<F: Future>(
    timeout: Duration,
    future: F,
) -> Result<F::Output, tokio::time::error::Elapsed> {
    tokio::time::timeout(timeout, future).await
}

/// Errors a [`MockTransport`] can be told to fail with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    #[error("No USB device found matching vendor ID {vendor_id} and product ID {product_id}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Permission denied for device")]
    PermissionDenied,

    #[error("No USB connection established")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

/// One call observed by a [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect { vendor_id: u16, product_id: u16 },
    Write(String),
    Disconnect,
}

/// Transport that records calls and fails on demand
///
/// Failures stay armed until [`MockTransport::clear_failures`] is called.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    connect_failure: Mutex<Option<MockError>>,
    write_failure: Mutex<Option<MockError>>,
    disconnect_failure: Mutex<Option<MockError>>,
    connected: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect_with(&self, error: MockError) {
        *self.connect_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_write_with(&self, error: MockError) {
        *self.write_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_disconnect_with(&self, error: MockError) {
        *self.disconnect_failure.lock().unwrap() = Some(error);
    }

    pub fn clear_failures(&self) {
        *self.connect_failure.lock().unwrap() = None;
        *self.write_failure.lock().unwrap() = None;
        *self.disconnect_failure.lock().unwrap() = None;
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Hex payloads received by `write`, in order
    pub fn writes(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write(hex) => Some(hex.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn armed(slot: &Mutex<Option<MockError>>) -> Result<(), MockError> {
        match slot.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NativeTransport for MockTransport {
    type Error = MockError;

    async fn connect(&self, vendor_id: u16, product_id: u16) -> Result<(), MockError> {
        self.record(TransportCall::Connect {
            vendor_id,
            product_id,
        });
        Self::armed(&self.connect_failure)?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, hex: &str) -> Result<(), MockError> {
        self.record(TransportCall::Write(hex.to_string()));
        Self::armed(&self.write_failure)
    }

    async fn disconnect(&self) -> Result<(), MockError> {
        self.record(TransportCall::Disconnect);
        Self::armed(&self.disconnect_failure)?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// `data` listener callback produced by [`FrameRecorder`]
pub type RecordingListener = Box<dyn Fn(&Bytes) + Send + Sync>;

/// Records frames delivered to one or more listeners
///
/// Every listener built from the same recorder appends to one shared log, so
/// delivery order across listeners can be asserted.
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    entries: Arc<Mutex<Vec<(usize, Bytes)>>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener that records frames under tag `0`
    pub fn listener(&self) -> RecordingListener {
        self.tagged(0)
    }

    /// Listener that records frames under `tag`
    pub fn tagged(&self, tag: usize) -> RecordingListener {
        let entries = Arc::clone(&self.entries);
        Box::new(move |frame: &Bytes| {
            entries.lock().unwrap().push((tag, frame.clone()));
        })
    }

    /// Recorded `(tag, frame)` pairs in delivery order
    pub fn entries(&self) -> Vec<(usize, Bytes)> {
        self.entries.lock().unwrap().clone()
    }

    /// Recorded frames in delivery order, ignoring tags
    pub fn frames(&self) -> Vec<Bytes> {
        self.entries().into_iter().map(|(_, frame)| frame).collect()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
