//! # UART Transport
//!
//! The transport sits between the UART peripheral and the command engine. It
//! is split in two halves:
//!
//! - [`UartBridge`] is the interrupt-facing half. The DMA idle-line handler
//!   hands every received span to [`UartBridge::on_rx_event`], which copies it
//!   into a lock-free single-producer/single-consumer pipe and returns, so the
//!   handler can re-arm its DMA target immediately. No byte is dropped in the
//!   re-arm window because the ISR never writes into memory the engine reads.
//! - [`Transport`] is the task-facing half. It drains the pipe into the
//!   caller-visible [`ReceiveBuffer`] and owns the single transmit slot.
//!
//! The bridge is usually placed in a `static`:
//!
//! ```ignore
//! static BRIDGE: UartBridge = UartBridge::new();
//!
//! // In the UART idle-line / DMA complete interrupt:
//! BRIDGE.on_rx_event(&dma_buf[..received]);
//!
//! // In the DMA transmit complete interrupt:
//! BRIDGE.on_tx_complete();
//! ```

use core::pin::pin;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer, with_timeout};
use embedded_io_async::ErrorType;
use futures::future::{Either, select};
use heapless::Vec;

use crate::buffer::ReceiveBuffer;
use crate::config::{Config, RX_BUF_SIZE, TX_BUF_SIZE};
use crate::error::{Error, Result};

/// Hardware seam: the UART peripheral with DMA transmit and idle-line
/// framed DMA receive.
///
/// Implementations only start and stop transfers. Completion is reported
/// back through the [`UartBridge`] from interrupt context.
pub trait Uart: ErrorType {
    /// Starts an asynchronous transmit of `bytes`.
    ///
    /// The slice stays valid and unmodified until the implementation calls
    /// [`UartBridge::on_tx_complete`] or [`abort_transmit`](Uart::abort_transmit)
    /// is called.
    fn start_transmit(&mut self, bytes: &[u8]) -> core::result::Result<(), Self::Error>;

    /// Aborts a transmit that did not complete within the ceiling.
    fn abort_transmit(&mut self) {}

    /// Arms the idle-line receive. Received spans go to [`UartBridge::on_rx_event`].
    fn start_receive(&mut self) -> core::result::Result<(), Self::Error>;

    fn stop_receive(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Interrupt-facing half of the transport.
pub struct UartBridge {
    rx: Pipe<CriticalSectionRawMutex, RX_BUF_SIZE>,
    tx_done: Signal<CriticalSectionRawMutex, ()>,
    tx_busy: AtomicBool,
    overrun: AtomicBool,
}

impl UartBridge {
    /// An idle bridge. `const`, so it can live in a `static`.
    pub const fn new() -> Self {
        Self {
            rx: Pipe::new(),
            tx_done: Signal::new(),
            tx_busy: AtomicBool::new(false),
            overrun: AtomicBool::new(false),
        }
    }

    /// Hands a received span over to the task side.
    ///
    /// Bytes that do not fit into the pipe are dropped and recorded as an
    /// overrun, which the next processing tick reports.
    pub fn on_rx_event(&self, span: &[u8]) {
        let mut rest = span;
        while !rest.is_empty() {
            match self.rx.try_write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(_) => {
                    self.overrun.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }

    /// Records a receive error reported by the peripheral (DMA or UART overrun).
    pub fn on_rx_error(&self) {
        self.overrun.store(true, Ordering::Release);
    }

    /// Marks the transmit slot free and wakes the waiting sender.
    pub fn on_tx_complete(&self) {
        self.tx_busy.store(false, Ordering::Release);
        self.tx_done.signal(());
    }

    /// Whether a transmit has started and not completed yet.
    pub fn is_tx_busy(&self) -> bool {
        self.tx_busy.load(Ordering::Acquire)
    }

    fn take_overrun(&self) -> bool {
        let overrun = self.overrun.load(Ordering::Acquire);
        if overrun {
            self.overrun.store(false, Ordering::Release);
        }
        overrun
    }
}

impl Default for UartBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Task-facing half of the transport.
pub struct Transport<'b, U: Uart> {
    uart: U,
    bridge: &'b UartBridge,
    rx: ReceiveBuffer,
    tx: Vec<u8, TX_BUF_SIZE>,
    config: Config,
    overrun: bool,
}

impl<'b, U: Uart> Transport<'b, U> {
    /// Pairs the peripheral with the bridge its interrupts feed.
    pub fn new(uart: U, bridge: &'b UartBridge, config: Config) -> Self {
        Self {
            uart,
            bridge,
            rx: ReceiveBuffer::new(),
            tx: Vec::new(),
            config,
            overrun: false,
        }
    }

    /// Arms the idle-line receive.
    pub fn start_receive(&mut self) -> Result<()> {
        self.uart
            .start_receive()
            .map_err(|e| uart_error("receive arm", e))
    }

    /// Disarms the idle-line receive.
    pub fn stop_receive(&mut self) -> Result<()> {
        self.uart
            .stop_receive()
            .map_err(|e| uart_error("receive stop", e))
    }

    /// Transmits `bytes`, one slot-sized chunk at a time.
    ///
    /// Each chunk waits for the slot to free up (`Busy` after the busy wait)
    /// and then for its own completion (`Timeout` after the ceiling).
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        for chunk in bytes.chunks(TX_BUF_SIZE) {
            self.transmit(chunk).await?;
        }
        Ok(())
    }

    async fn transmit(&mut self, chunk: &[u8]) -> Result<()> {
        if self.bridge.is_tx_busy()
            && with_timeout(self.config.tx_busy_wait, self.bridge.tx_done.wait())
                .await
                .is_err()
        {
            warn!("transmit slot still busy");
            return Err(Error::Busy);
        }

        self.tx.clear();
        // Chunks never exceed the slot.
        let _ = self.tx.extend_from_slice(chunk);

        self.bridge.tx_done.reset();
        self.bridge.tx_busy.store(true, Ordering::Release);
        if let Err(e) = self.uart.start_transmit(&self.tx) {
            self.bridge.tx_busy.store(false, Ordering::Release);
            return Err(uart_error("transmit", e));
        }

        match with_timeout(self.config.tx_timeout, self.bridge.tx_done.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!("transmit of {} bytes timed out", chunk.len());
                self.uart.abort_transmit();
                self.bridge.tx_busy.store(false, Ordering::Release);
                Err(Error::Timeout)
            }
        }
    }

    /// Moves everything the bridge holds into the receive buffer without waiting.
    ///
    /// Returns the number of bytes moved.
    pub fn pump(&mut self) -> usize {
        let mut chunk = [0u8; 64];
        let mut moved = 0;
        while let Ok(n) = self.bridge.rx.try_read(&mut chunk) {
            self.store(&chunk[..n]);
            moved += n;
        }
        moved
    }

    /// Waits until new bytes arrive or `deadline` passes.
    ///
    /// Returns `true` if bytes were appended to the receive buffer.
    pub async fn receive_until(&mut self, deadline: Instant) -> bool {
        let mut chunk = [0u8; 64];
        let n = {
            let read = pin!(self.bridge.rx.read(&mut chunk));
            let timer = pin!(Timer::at(deadline));
            match select(read, timer).await {
                Either::Left((n, _)) => n,
                Either::Right(_) => 0,
            }
        };
        if n == 0 {
            return false;
        }
        self.store(&chunk[..n]);
        self.pump();
        true
    }

    fn store(&mut self, bytes: &[u8]) {
        if self.rx.append(bytes) < bytes.len() {
            self.overrun = true;
        }
    }

    /// Returns whether bytes were lost since the last call, on either side
    /// of the bridge.
    pub fn take_overrun(&mut self) -> bool {
        let lost = self.bridge.take_overrun() | self.overrun;
        self.overrun = false;
        lost
    }

    /// Resets the receive buffer. The receive arm is left untouched.
    pub fn clear(&mut self) {
        self.rx.clear();
    }

    /// The receive buffer.
    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.rx
    }

    pub fn buffer_mut(&mut self) -> &mut ReceiveBuffer {
        &mut self.rx
    }

    /// The peripheral.
    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }
}

fn uart_error<E: embedded_io_async::Error>(op: &str, e: E) -> Error {
    warn!("uart {} failed: {:?}", op, e.kind());
    Error::Uart
}
