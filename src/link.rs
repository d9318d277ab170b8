//! ==============================================================================
//! link.rs - peripheral link to the irrigation controller
//! ==============================================================================
//!
//! purpose:
//!     a byte-oriented channel to the paired controller. the monitor writes
//!     `STATUS` and reads one reply line; configuration uploads are plain
//!     writes.
//!
//! implementations:
//!     - MockLink: random but plausible readings, formatted like the real
//!       controller so the same decoder path is exercised. set-points are
//!       read from the live ConfigContext on every exchange.
//!     - FixtureLink: scripted replies for tests.
//!     - SerialLink (feature = "hardware"): rppal UART on the serial device
//!       the Bluetooth module is bound to.
//!
//! relationships:
//!     - used by: monitor.rs (status refresh, plant config upload)
//!     - uses: decoder.rs (MockLink formats with `to_wire`)
//!
//! ==============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::{ConfigContext, LinkConfig, LinkKind};
use crate::decoder::STATUS_REQUEST;
use crate::domain::{EnvironmentReading, FarmReading, SystemSnapshot};

/// transport-level failures; the decoder never sees these
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("link i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("peripheral closed the link")]
    Empty,
}

pub trait PeripheralLink: Send {
    /// write `request` and read back one reply
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, LinkError>;

    /// write `payload` without waiting for a reply
    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// short human-readable name for logs
    fn describe(&self) -> String;
}

pub fn open_link(config: &LinkConfig, farms: &ConfigContext) -> anyhow::Result<Box<dyn PeripheralLink>> {
    match config.kind {
        LinkKind::Mock => {
            let link = match config.seed {
                Some(seed) => MockLink::seeded(seed, farms),
                None => MockLink::new(farms),
            };
            Ok(Box::new(link))
        }
        #[cfg(feature = "hardware")]
        LinkKind::Serial => Ok(Box::new(SerialLink::open(config)?)),
        #[cfg(not(feature = "hardware"))]
        LinkKind::Serial => anyhow::bail!(
            "link kind \"serial\" ({}) needs a build with the `hardware` feature",
            config.device
        ),
    }
}

// ==============================================================================================
// MOCK CONTROLLER
// ==============================================================================================

/// stand-in controller producing random readings
pub struct MockLink {
    rng: StdRng,
    farms: ConfigContext,
}

impl MockLink {
    pub fn new(farms: &ConfigContext) -> Self {
        Self::seeded(rand::random(), farms)
    }

    pub fn seeded(seed: u64, farms: &ConfigContext) -> Self {
        tracing::info!(seed, "Using MOCK controller link (no hardware access)");
        Self { rng: StdRng::seed_from_u64(seed), farms: farms.clone() }
    }

    fn next_snapshot(&mut self) -> SystemSnapshot {
        let farm = |rng: &mut StdRng, ideal: u32| {
            let current = rng.random_range(0..=100);
            FarmReading { current_moisture: current, ideal_moisture: ideal, pump_active: current < ideal }
        };
        let farms = self.farms.get();
        let farm_a = farm(&mut self.rng, farms.ideal_moisture_a);
        let farm_b = farm(&mut self.rng, farms.ideal_moisture_b);
        // one fractional digit, as the controller reports it
        let tenth = |v: f64| (v * 10.0).round() / 10.0;
        let environment = EnvironmentReading {
            temperature_celsius: tenth(self.rng.random_range(15.0..35.0)),
            humidity_percent: tenth(self.rng.random_range(30.0..90.0)),
            is_raining: self.rng.random_bool(0.2),
        };
        SystemSnapshot { farm_a, farm_b, environment }
    }
}

impl PeripheralLink for MockLink {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, LinkError> {
        if request != STATUS_REQUEST {
            tracing::debug!("[MOCK LINK] ignoring request {}", hex::encode(request));
            return Err(LinkError::Timeout);
        }
        let reply = format!("{}\r\n", self.next_snapshot().to_wire());
        tracing::debug!("[MOCK LINK] reply {}", reply.trim_end());
        Ok(reply.into_bytes())
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        tracing::debug!("[MOCK LINK] Write: {} bytes", payload.len());
        Ok(())
    }

    fn describe(&self) -> String {
        "mock controller".to_string()
    }
}

// ==============================================================================================
// FIXTURE LINK
// ==============================================================================================

/// scripted link: pops one queued reply per exchange and records writes
#[derive(Clone, Default)]
pub struct FixtureLink {
    replies: Arc<Mutex<VecDeque<Result<Vec<u8>, LinkError>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FixtureLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: impl Into<Vec<u8>>) -> &Self {
        self.queue().push_back(Ok(reply.into()));
        self
    }

    pub fn push_failure(&self, err: LinkError) -> &Self {
        self.queue().push_back(Err(err));
        self
    }

    /// every byte string written so far, requests included
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<u8>, LinkError>>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, bytes: &[u8]) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(bytes.to_vec());
    }
}

impl PeripheralLink for FixtureLink {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, LinkError> {
        self.record(request);
        self.queue().pop_front().unwrap_or(Err(LinkError::Empty))
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.record(payload);
        Ok(())
    }

    fn describe(&self) -> String {
        "fixture".to_string()
    }
}

// ==============================================================================================
// SERIAL LINK (Raspberry Pi UART)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub struct SerialLink {
    uart: rppal::uart::Uart,
    device: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "hardware")]
impl SerialLink {
    pub fn open(config: &LinkConfig) -> Result<Self, LinkError> {
        use rppal::uart::{Parity, Uart};

        let timeout = std::time::Duration::from_millis(config.timeout_ms);
        let mut uart = Uart::with_path(&config.device, config.baud_rate, Parity::None, 8, 1)
            .map_err(|e| LinkError::Connect(format!("{}: {}", config.device, e)))?;
        // block per read until at least one byte or the timeout
        uart.set_read_mode(1, timeout)
            .map_err(|e| LinkError::Connect(e.to_string()))?;
        tracing::info!(device = %config.device, baud = config.baud_rate, "Using SERIAL controller link (rppal)");
        Ok(Self { uart, device: config.device.clone(), timeout })
    }

    fn write_all(&mut self, mut data: &[u8]) -> Result<(), LinkError> {
        while !data.is_empty() {
            let n = self.uart.write(data).map_err(uart_io)?;
            if n == 0 {
                return Err(LinkError::Timeout);
            }
            data = &data[n..];
        }
        self.uart.drain().map_err(uart_io)
    }
}

#[cfg(feature = "hardware")]
fn uart_io(e: rppal::uart::Error) -> LinkError {
    match e {
        rppal::uart::Error::Io(io) => LinkError::Io(io),
        other => LinkError::Connect(other.to_string()),
    }
}

#[cfg(feature = "hardware")]
impl PeripheralLink for SerialLink {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, LinkError> {
        // drop leftovers (a late line terminator) from the previous reply
        self.uart.flush(rppal::uart::Queue::Input).map_err(uart_io)?;
        self.write_all(request)?;

        let deadline = std::time::Instant::now() + self.timeout;
        let mut reply = Vec::new();
        let mut buf = [0u8; 64];
        // one reply ends at the closing bracket or a newline
        while !reply.ends_with(b">") && !reply.ends_with(b"\n") {
            if std::time::Instant::now() >= deadline {
                return Err(LinkError::Timeout);
            }
            let n = self.uart.read(&mut buf).map_err(uart_io)?;
            if n == 0 {
                if reply.is_empty() {
                    return Err(LinkError::Timeout);
                }
                break;
            }
            reply.extend_from_slice(&buf[..n]);
        }
        tracing::debug!("[UART] {} <- {}", self.device, hex::encode(&reply));
        Ok(reply)
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        tracing::debug!("[UART] {} -> {} bytes", self.device, payload.len());
        self.write_all(payload)
    }

    fn describe(&self) -> String {
        format!("serial {}", self.device)
    }
}
