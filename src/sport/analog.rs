//! # Analog Link Values
//!
//! 8-bit values relayed by the receiver itself: RSSI, SWR and the two
//! analog inputs A1/A2. Voltage-like samples are smoothed over the last four
//! readings; raw extremes are tracked alongside.

use serde::{Deserialize, Serialize};

use crate::telemetry::units::TelemetryUnit;

/// Samples kept besides the newest one
pub const ANALOG_HISTORY_LEN: usize = 3;

/// Smoothed 8-bit link value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalogValue {
    /// Averaged value
    pub value: u8,
    /// Smallest raw sample seen
    pub min: u8,
    /// Largest raw sample seen
    pub max: u8,
    history: [u8; ANALOG_HISTORY_LEN],
    raw: u8,
}

impl AnalogValue {
    /// Push a sample through the moving average
    ///
    /// The first sample (or any sample while the average is zero) seeds the
    /// whole history.
    pub fn set(&mut self, sample: u8) {
        if self.value == 0 {
            self.history = [sample; ANALOG_HISTORY_LEN];
            self.value = sample;
        } else {
            let sum: u16 = self.history.iter().map(|&v| u16::from(v)).sum::<u16>() + u16::from(sample);
            self.history.rotate_left(1);
            self.history[ANALOG_HISTORY_LEN - 1] = sample;
            self.value = (sum / (ANALOG_HISTORY_LEN as u16 + 1)) as u8;
        }
        self.track(sample);
    }

    /// Push a sample for a channel of the given unit
    ///
    /// Only voltages are averaged; other channels report the sample as is.
    pub fn set_with_unit(&mut self, sample: u8, unit: TelemetryUnit) {
        if unit == TelemetryUnit::Volts {
            self.set(sample);
        } else {
            self.value = sample;
            self.track(sample);
        }
    }

    /// Last raw sample
    pub fn raw(&self) -> u8 {
        self.raw
    }

    fn track(&mut self, sample: u8) {
        self.raw = sample;
        if self.min == 0 || sample < self.min {
            self.min = sample;
        }
        if sample > self.max {
            self.max = sample;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Scaling of one analog input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogChannel {
    /// Full-scale value in the channel unit (before the multiplier)
    pub ratio: u8,
    /// Raw offset added before scaling
    #[serde(default)]
    pub offset: i8,
    /// Left shift applied to `ratio` (0..=3)
    #[serde(default)]
    pub multiplier: u8,
    #[serde(default = "default_channel_unit")]
    pub unit: TelemetryUnit,
}

fn default_channel_unit() -> TelemetryUnit { TelemetryUnit::Volts }

impl Default for AnalogChannel {
    fn default() -> Self {
        Self {
            ratio: 132,
            offset: 0,
            multiplier: 0,
            unit: default_channel_unit(),
        }
    }
}

impl AnalogChannel {
    /// Scale a raw 8-bit reading to the channel unit
    ///
    /// # Examples
    ///
    /// ```
    /// use sport_telemetry::sport::analog::AnalogChannel;
    ///
    /// let channel = AnalogChannel { ratio: 51, ..Default::default() };
    /// assert_eq!(channel.apply_ratio(255), 510);
    /// ```
    pub fn apply_ratio(&self, value: u8) -> i32 {
        let ratio = i32::from(self.ratio) << self.multiplier.min(3);
        (i32::from(value) + i32::from(self.offset)) * ratio * 2 / 51
    }
}
