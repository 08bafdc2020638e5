//! Lamp drivers

use crate::error::LampError;
use crate::pin::{OutputPin, SysfsPin};
use crate::state::{LampColor, LampPattern, LampState};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use fwstation_config::GpioConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest wait for a blink thread to stop before a new pattern is applied
const BLINK_JOIN_WAIT: Duration = Duration::from_secs(1);

/// Something that can display a [`LampState`]
pub trait StatusLamp: Send + Sync {
    /// Switch to `state`, replacing whatever was shown
    fn show(&self, state: LampState);

    /// State currently shown
    fn current(&self) -> LampState;

    /// Turn everything off and release the hardware
    fn release(&self);
}

struct Pins<P> {
    green: P,
    yellow: P,
    red: P,
}

impl<P: OutputPin> Pins<P> {
    fn pin(&mut self, color: LampColor) -> &mut P {
        match color {
            LampColor::Green => &mut self.green,
            LampColor::Yellow => &mut self.yellow,
            LampColor::Red => &mut self.red,
        }
    }

    fn set(&mut self, color: LampColor, high: bool) {
        if let Err(e) = self.pin(color).set(high) {
            warn!(?color, error = %e, "Failed to drive lamp");
        }
    }

    fn all_off(&mut self) {
        for color in [LampColor::Green, LampColor::Yellow, LampColor::Red] {
            self.set(color, false);
        }
    }
}

struct BlinkWorker {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl BlinkWorker {
    fn stop(self) {
        // A full or disconnected channel means the thread is already stopping.
        let _ = self.stop.try_send(());
        drop(self.stop);

        let deadline = Instant::now() + BLINK_JOIN_WAIT;
        while !self.thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if !self.thread.is_finished() {
            warn!("Blink thread did not stop in time, detaching");
            return;
        }
        if self.thread.join().is_err() {
            warn!("Blink thread panicked");
        }
    }
}

/// Three-lamp indicator on output pins
pub struct GpioLamp<P: OutputPin> {
    pins: Arc<Mutex<Pins<P>>>,
    current: Mutex<LampState>,
    blink: Mutex<Option<BlinkWorker>>,
}

impl GpioLamp<SysfsPin> {
    /// Export the configured GPIO lines
    pub fn open(config: &GpioConfig) -> Result<Self, LampError> {
        let green = SysfsPin::export(&config.chip_path, config.led_green)?;
        let yellow = SysfsPin::export(&config.chip_path, config.led_yellow)?;
        let red = SysfsPin::export(&config.chip_path, config.led_red)?;
        info!(
            green = config.led_green,
            yellow = config.led_yellow,
            red = config.led_red,
            "Status lamp initialized"
        );
        Ok(Self::new(green, yellow, red))
    }
}

impl<P: OutputPin> GpioLamp<P> {
    /// Lamp over three pins, all dark
    pub fn new(green: P, yellow: P, red: P) -> Self {
        let mut pins = Pins { green, yellow, red };
        pins.all_off();
        Self {
            pins: Arc::new(Mutex::new(pins)),
            current: Mutex::new(LampState::Off),
            blink: Mutex::new(None),
        }
    }

    fn spawn_blink(&self, color: LampColor, period: Duration) -> Result<BlinkWorker, LampError> {
        let (stop, stop_rx) = channel::bounded::<()>(1);
        let pins = Arc::clone(&self.pins);
        let thread = thread::Builder::new()
            .name("lamp-blink".to_string())
            .spawn(move || {
                let mut lit = true;
                loop {
                    pins.lock().set(color, lit);
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => lit = !lit,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                pins.lock().set(color, false);
            })
            .map_err(|e| LampError::Thread(e.to_string()))?;
        Ok(BlinkWorker { stop, thread })
    }
}

impl<P: OutputPin> StatusLamp for GpioLamp<P> {
    fn show(&self, state: LampState) {
        let mut blink = self.blink.lock();
        if let Some(worker) = blink.take() {
            worker.stop();
        }
        self.pins.lock().all_off();

        match state.pattern() {
            LampPattern::Dark => {}
            LampPattern::Solid(color) => self.pins.lock().set(color, true),
            LampPattern::Blink { color, period } => match self.spawn_blink(color, period) {
                Ok(worker) => *blink = Some(worker),
                Err(e) => {
                    warn!(error = %e, "Cannot blink, showing solid");
                    self.pins.lock().set(color, true);
                }
            },
        }

        let previous = std::mem::replace(&mut *self.current.lock(), state);
        debug!(%previous, %state, "Lamp transition");
    }

    fn current(&self) -> LampState {
        *self.current.lock()
    }

    fn release(&self) {
        if let Some(worker) = self.blink.lock().take() {
            worker.stop();
        }
        let mut pins = self.pins.lock();
        pins.all_off();
        for color in [LampColor::Green, LampColor::Yellow, LampColor::Red] {
            if let Err(e) = pins.pin(color).release() {
                warn!(?color, error = %e, "Failed to release lamp");
            }
        }
        *self.current.lock() = LampState::Off;
        debug!("Lamp released");
    }
}

impl<P: OutputPin> Drop for GpioLamp<P> {
    fn drop(&mut self) {
        if let Some(worker) = self.blink.get_mut().take() {
            worker.stop();
        }
    }
}

/// Lamp that only logs, for stations without GPIO
#[derive(Debug, Default)]
pub struct LogLamp {
    current: Mutex<LampState>,
}

impl LogLamp {
    /// New lamp, showing [`LampState::Off`]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusLamp for LogLamp {
    fn show(&self, state: LampState) {
        let previous = std::mem::replace(&mut *self.current.lock(), state);
        if previous != state {
            info!(%state, "Lamp");
        }
    }

    fn current(&self) -> LampState {
        *self.current.lock()
    }

    fn release(&self) {
        *self.current.lock() = LampState::Off;
        debug!("Lamp released");
    }
}
