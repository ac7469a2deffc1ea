//! Snapshot illumination
//!
//! One physical LED, so one owner at a time: [`Flash::engage`] waits for any
//! other snapshot to finish, switches the LED on, and the returned guard
//! switches it off again when dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

/// PWM output driving the illumination LED
pub trait LedDriver: Send + Sync {
    /// Set the PWM duty cycle (0 = off, 255 = full)
    fn set_duty(&self, duty: u8);
}

/// LED driver that only traces duty changes
///
/// Used on hosts without a GPIO controller; the pin number is kept so logs
/// match the wiring the config describes.
#[derive(Debug)]
pub struct LoggingLed {
    pin: u32,
}

impl LoggingLed {
    #[must_use]
    pub const fn new(pin: u32) -> Self {
        Self { pin }
    }
}

impl LedDriver for LoggingLed {
    fn set_duty(&self, duty: u8) {
        tracing::debug!(pin = self.pin, duty, "flash duty");
    }
}

/// Observable illumination state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IlluminationState {
    pub on: bool,
    pub intensity: u8,
}

/// The illumination source, owned by at most one snapshot at a time
pub struct Flash {
    driver: Option<Arc<dyn LedDriver>>,
    intensity: u8,
    lit: AtomicBool,
    owner: Mutex<()>,
}

impl Flash {
    /// Wrap an LED driver; `None` makes illumination a no-op
    ///
    /// The LED is switched off immediately.
    #[must_use]
    pub fn new(driver: Option<Arc<dyn LedDriver>>, intensity: u8) -> Self {
        let flash = Self {
            driver,
            intensity,
            lit: AtomicBool::new(false),
            owner: Mutex::new(()),
        };
        flash.apply(false);
        flash
    }

    /// Flash with no LED attached
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    /// Take exclusive ownership of the LED and switch it on
    pub async fn engage(&self) -> FlashGuard<'_> {
        let owner = self.owner.lock().await;
        self.apply(true);
        FlashGuard {
            flash: self,
            _owner: owner,
        }
    }

    #[must_use]
    pub fn state(&self) -> IlluminationState {
        IlluminationState {
            on: self.lit.load(Ordering::Acquire),
            intensity: self.intensity,
        }
    }

    fn apply(&self, on: bool) {
        let Some(driver) = &self.driver else {
            return;
        };
        driver.set_duty(if on { self.intensity } else { 0 });
        self.lit.store(on, Ordering::Release);
    }
}

/// LED is on while this guard lives
pub struct FlashGuard<'a> {
    flash: &'a Flash,
    _owner: MutexGuard<'a, ()>,
}

impl Drop for FlashGuard<'_> {
    fn drop(&mut self) {
        self.flash.apply(false);
    }
}
