//! Interrupt IN reader thread
//!
//! Polls the device's interrupt IN endpoint on a dedicated OS thread and
//! publishes every completed read to the host event emitter as hex text on
//! `"usbData"`.
//!
//! ```text
//! loop:
//!   read_interrupt(timeout) ──ok──► emit("usbData", hex)
//!                           ──timeout──► (nothing)
//!                           ──no device──► stop
//!   sleep(interval)
//! ```

use common::HostEventEmitter;
use protocol::{USB_DATA_CHANNEL, encode_hex};
use rusb::{Context, DeviceHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// Something that can perform interrupt IN transfers
pub trait InterruptIn: Send + Sync + 'static {
    fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration)
    -> rusb::Result<usize>;
}

impl InterruptIn for DeviceHandle<Context> {
    fn read_interrupt(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_interrupt(self, endpoint, buf, timeout)
    }
}

/// Reader timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Pause between reads
    pub interval: Duration,
    /// Timeout of each read
    pub timeout: Duration,
}

/// Handle to a running reader thread
///
/// Stopping (explicitly or by drop) signals the thread and joins it.
pub struct InterruptReader {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InterruptReader {
    pub fn spawn<R: InterruptIn>(
        source: Arc<R>,
        endpoint: u8,
        packet_size: usize,
        events: HostEventEmitter,
        settings: ReaderSettings,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("usb-reader".to_string())
            .spawn(move || read_loop(&*source, endpoint, packet_size, &events, settings, &flag))?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Whether the thread is still polling
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("USB reader thread panicked");
        }
    }
}

impl Drop for InterruptReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop<R: InterruptIn + ?Sized>(
    source: &R,
    endpoint: u8,
    packet_size: usize,
    events: &HostEventEmitter,
    settings: ReaderSettings,
    running: &AtomicBool,
) {
    info!("USB reader started on endpoint {:#04x}", endpoint);
    let mut buffer = vec![0u8; packet_size.max(1)];

    while running.load(Ordering::Acquire) {
        match source.read_interrupt(endpoint, &mut buffer, settings.timeout) {
            Ok(len) => {
                let hex = encode_hex(&buffer[..len]);
                trace!("USB data read: {}", hex);
                events.emit(USB_DATA_CHANNEL, &hex);
            }
            Err(rusb::Error::Timeout) => {}
            Err(rusb::Error::NoDevice) => {
                warn!("USB device disappeared, reader stopping");
                break;
            }
            Err(e) => {
                warn!("Interrupt read on endpoint {:#04x} failed: {}", endpoint, e);
            }
        }

        std::thread::sleep(settings.interval);
    }

    info!("USB reader stopped");
}
