//! # Telemetry Session
//!
//! Everything a connected model accumulates: the sensor store, the legacy
//! hub record, the link-relayed analog values and the settings that shape
//! them. Created when a session starts, reset when the model changes.

use tracing::debug;

use crate::sport::analog::{AnalogChannel, AnalogValue};
use crate::sport::decoder;
use crate::sport::hub::{HubData, HubParser, HubSettings};
use crate::sport::link::LinkStatus;
use crate::sport::protocol::SportPacket;
use crate::telemetry::{SensorRegistry, TelemetryStore};

/// Number of receiver analog inputs (A1/A2)
pub const ANALOG_CHANNELS: usize = 2;

/// Model-level telemetry settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub hub: HubSettings,
    /// Whether SWR frames are trusted
    pub swr_enabled: bool,
    /// Analog input feeding the hub vertical speed
    pub vario_source: Option<usize>,
    /// Keep the hub distance from the pilot up to date
    pub gps_distance: bool,
    pub analog: [AnalogChannel; ANALOG_CHANNELS],
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            hub: HubSettings::default(),
            swr_enabled: true,
            vario_source: None,
            gps_distance: false,
            analog: [AnalogChannel::default(); ANALOG_CHANNELS],
        }
    }
}

/// Owned decode and fusion state for one connected model
#[derive(Debug, Clone)]
pub struct TelemetrySession {
    pub(crate) store: TelemetryStore,
    pub(crate) hub: HubData,
    pub(crate) rssi: AnalogValue,
    pub(crate) swr: AnalogValue,
    pub(crate) analog: [AnalogValue; ANALOG_CHANNELS],
    pub(crate) settings: TelemetrySettings,
    hub_parser: HubParser,
}

impl Default for TelemetrySession {
    fn default() -> Self {
        Self::new(SensorRegistry::new(), TelemetrySettings::default())
    }
}

impl TelemetrySession {
    /// Start a session over a sensor configuration
    pub fn new(registry: SensorRegistry, settings: TelemetrySettings) -> Self {
        Self {
            store: TelemetryStore::new(registry, settings.hub.timezone),
            hub: HubData::default(),
            rssi: AnalogValue::default(),
            swr: AnalogValue::default(),
            analog: [AnalogValue::default(); ANALOG_CHANNELS],
            settings,
            hub_parser: HubParser::new(),
        }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TelemetryStore {
        &mut self.store
    }

    pub fn hub(&self) -> &HubData {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut HubData {
        &mut self.hub
    }

    pub fn rssi(&self) -> &AnalogValue {
        &self.rssi
    }

    pub fn swr(&self) -> &AnalogValue {
        &self.swr
    }

    pub fn analog(&self, index: usize) -> Option<&AnalogValue> {
        self.analog.get(index)
    }

    pub fn settings(&self) -> &TelemetrySettings {
        &self.settings
    }

    /// Replace the model settings; the time zone applies to later GPS times
    pub fn set_settings(&mut self, settings: TelemetrySettings) {
        self.store.set_timezone(settings.hub.timezone);
        self.settings = settings;
    }

    /// Decode one deframed S.Port packet
    ///
    /// # Returns
    ///
    /// * `bool` - Whether the packet passed validation
    pub fn process_sport_packet<L: LinkStatus + ?Sized>(&mut self, packet: &SportPacket, link: &mut L) -> bool {
        decoder::process_sport_packet(self, packet, link)
    }

    /// Decode one legacy (identifier, value) pair
    pub fn process_hub_packet(&mut self, id: u8, value: u16) {
        let settings = self.settings.hub;
        self.hub.gps_distance_needed = self.gps_distance_needed();
        self.hub.process_hub_packet(id, value, &settings);
    }

    /// Decode the hub bytes of a D-link user-data packet
    pub fn process_hub_user_packet(&mut self, packet: &[u8]) {
        let settings = self.settings.hub;
        self.hub.gps_distance_needed = self.gps_distance_needed();
        let hub = &mut self.hub;
        self.hub_parser
            .feed_user_packet(packet, |id, value| hub.process_hub_packet(id, value, &settings));
    }

    /// Whether anything consumes the hub distance from the pilot
    fn gps_distance_needed(&self) -> bool {
        self.settings.gps_distance || self.store.registry().has_distance_sensor()
    }

    /// Store a sample from one of the receiver analog inputs
    pub(crate) fn set_analog(&mut self, index: usize, sample: u8) {
        let Some(channel) = self.settings.analog.get(index).copied() else {
            return;
        };
        self.analog[index].set_with_unit(sample, channel.unit);

        if self.settings.vario_source == Some(index) {
            self.hub.vario_speed = channel.apply_ratio(self.analog[index].value) as i16;
        }
    }

    /// Advance freshness by one cycle
    pub fn tick(&mut self) {
        self.store.tick();
    }

    /// Forget every received value, keeping configuration and settings
    pub fn reset(&mut self) {
        debug!("Telemetry session reset");
        self.store.reset();
        self.hub = HubData::default();
        self.hub_parser.reset();
        self.rssi.clear();
        self.swr.clear();
        for value in &mut self.analog {
            value.clear();
        }
    }
}
