//! # S.Port Packet Decoder
//!
//! Validates a deframed packet and routes its reading:
//! - reserved receiver identifiers (RSSI, SWR, A1/A2, battery) go to the
//!   session's analog values
//! - identifiers below `0x0100` go to the legacy hub decoder
//! - everything else is resolved through the descriptor table and stored in
//!   a sensor slot
//!
//! Only RSSI (which re-arms the link timeout) and SWR are accepted while the
//! link is not streaming; receivers keep sending old A1/A2 values after the
//! model side powers down.

use tracing::trace;

use super::checksum::check_sport_packet;
use super::link::LinkStatus;
use super::protocol::*;
use super::sensors::get_sport_sensor;
use crate::session::TelemetrySession;
use crate::telemetry::registry::TelemetryProtocol;
use crate::telemetry::units::TelemetryUnit;

/// Decode one deframed packet into the session
///
/// # Arguments
///
/// * `session` - Session receiving the reading
/// * `packet` - Deframed 9-byte packet
/// * `link` - Link status collaborator
///
/// # Returns
///
/// * `bool` - `false` when the packet was dropped for a bad checksum or a
///   non-data frame kind
pub fn process_sport_packet<L: LinkStatus + ?Sized>(
    session: &mut TelemetrySession,
    packet: &SportPacket,
    link: &mut L,
) -> bool {
    if !check_sport_packet(packet.as_bytes()) {
        trace!("Dropping S.Port packet with bad checksum: {:02X?}", packet.as_bytes());
        return false;
    }

    if packet.frame_kind() != SPORT_DATA_FRAME {
        trace!("Ignoring S.Port frame kind {:#04x}", packet.frame_kind());
        return false;
    }

    let app_id = packet.app_id();
    let mut data = packet.data_i32();

    match app_id {
        RSSI_ID => {
            link.reset_link_timeout();
            data = i32::from(packet.data_u8());
            session.rssi.set(packet.data_u8());
        }
        SWR_ID => {
            if !session.settings.swr_enabled {
                return true;
            }
            data = i32::from(packet.data_u8());
            session.swr.set(packet.data_u8());
        }
        _ => {}
    }

    if !link.is_streaming() {
        trace!("Link not streaming, dropping id {:04X}", app_id);
        return true;
    }

    match app_id {
        ADC1_ID | ADC2_ID => session.set_analog(usize::from(app_id - ADC1_ID), packet.data_u8()),
        BATT_ID => session.analog[0].set_with_unit(packet.data_u8(), TelemetryUnit::Volts),
        _ if app_id >> 8 == 0 => session.process_hub_packet(app_id as u8, packet.hub_u16()),
        _ => {
            let (unit, prec) = get_sport_sensor(app_id).map_or((TelemetryUnit::Raw, 0), |sensor| (sensor.unit, sensor.prec));
            session
                .store
                .set_telemetry_value(TelemetryProtocol::Sport, app_id, packet.physical_id(), data, unit, prec);
            session.store.evaluate_calculated();
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport::checksum::finalize_checksum;
    use crate::sport::hub::ids;
    use crate::sport::link::MockLinkStatus;
    use crate::session::TelemetrySettings;
    use crate::telemetry::SensorRegistry;

    fn sealed(physical_id: u8, app_id: u16, data: u32) -> SportPacket {
        let mut packet = SportPacket::data(physical_id, app_id, data);
        finalize_checksum(packet.as_bytes_mut());
        packet
    }

    fn streaming() -> MockLinkStatus {
        let mut link = MockLinkStatus::new();
        link.expect_is_streaming().return_const(true);
        link.expect_reset_link_timeout().return_const(());
        link
    }

    #[test]
    fn test_bad_checksum_dropped() {
        let mut session = TelemetrySession::default();
        let mut link = MockLinkStatus::new();
        link.expect_is_streaming().never();
        link.expect_reset_link_timeout().never();

        let mut packet = sealed(0x98, 0x0210, 1180);
        packet.as_bytes_mut()[5] ^= 0x01;

        assert!(!process_sport_packet(&mut session, &packet, &mut link));
        assert!(session.store().readings().is_empty());
    }

    #[test]
    fn test_captured_hub_packet() {
        let mut session = TelemetrySession::default();
        let mut link = streaming();
        let packet = SportPacket::new([0x98, 0x10, 0x10, 0x00, 0x7E, 0x02, 0x00, 0x00, 0x5F]);

        assert!(process_sport_packet(&mut session, &packet, &mut link));
        assert_eq!(session.hub().baro_altitude_bp, 0x027E);
        assert!(session.store().readings().is_empty());
    }

    #[test]
    fn test_non_data_frame_ignored() {
        let mut session = TelemetrySession::default();
        let mut link = MockLinkStatus::new();
        link.expect_is_streaming().never();

        let mut packet = sealed(0x98, 0x0210, 1180);
        packet.as_bytes_mut()[1] = 0x30;
        finalize_checksum(packet.as_bytes_mut());

        assert!(!process_sport_packet(&mut session, &packet, &mut link));
    }

    #[test]
    fn test_rssi_rearms_link_and_is_stored() {
        let mut session = TelemetrySession::default();
        let mut link = MockLinkStatus::new();
        link.expect_reset_link_timeout().times(1).return_const(());
        link.expect_is_streaming().return_const(true);

        process_sport_packet(&mut session, &sealed(0x98, RSSI_ID, 0x1234_5600 | 72), &mut link);

        assert_eq!(session.rssi().value, 72);
        let readings = session.store().readings();
        assert_eq!(readings[0].label, "RSSI");
        assert_eq!(readings[0].value, 72);
    }

    #[test]
    fn test_not_streaming_keeps_only_link_values() {
        let mut session = TelemetrySession::default();
        let mut link = MockLinkStatus::new();
        link.expect_reset_link_timeout().return_const(());
        link.expect_is_streaming().return_const(false);

        process_sport_packet(&mut session, &sealed(0x98, RSSI_ID, 60), &mut link);
        process_sport_packet(&mut session, &sealed(0x98, SWR_ID, 20), &mut link);
        process_sport_packet(&mut session, &sealed(0x98, ADC1_ID, 100), &mut link);
        process_sport_packet(&mut session, &sealed(0x98, 0x0210, 1180), &mut link);
        process_sport_packet(&mut session, &sealed(0x98, 0x0004, 50), &mut link);

        assert_eq!(session.rssi().value, 60);
        assert_eq!(session.swr().value, 20);
        assert_eq!(session.analog(0).unwrap().value, 0);
        assert_eq!(session.hub().fuel_level, 0);
        assert!(session.store().readings().is_empty());
    }

    #[test]
    fn test_swr_disabled() {
        let settings = TelemetrySettings {
            swr_enabled: false,
            ..Default::default()
        };
        let mut session = TelemetrySession::new(SensorRegistry::new(), settings);
        let mut link = MockLinkStatus::new();
        link.expect_is_streaming().never();

        assert!(process_sport_packet(&mut session, &sealed(0x98, SWR_ID, 20), &mut link));
        assert_eq!(session.swr().value, 0);
        assert!(session.store().readings().is_empty());
    }

    #[test]
    fn test_analog_inputs_and_battery() {
        let mut session = TelemetrySession::default();
        let mut link = streaming();

        process_sport_packet(&mut session, &sealed(0x98, ADC2_ID, 0xFF00 | 90), &mut link);
        assert_eq!(session.analog(1).unwrap().value, 90);

        process_sport_packet(&mut session, &sealed(0x98, BATT_ID, 120), &mut link);
        assert_eq!(session.analog(0).unwrap().value, 120);

        assert!(session.store().readings().is_empty());
    }

    #[test]
    fn test_legacy_ids_reach_hub() {
        let mut session = TelemetrySession::default();
        let mut link = streaming();

        // Upper payload bytes are not part of a legacy value
        process_sport_packet(&mut session, &sealed(0x98, 0x0004, 0xABCD_0064), &mut link);
        assert_eq!(session.hub().fuel_level, 100);
    }

    fn legacy(id: u8, value: u16) -> SportPacket {
        sealed(0x98, u16::from(id), u32::from(value))
    }

    fn legacy_cell(index: u16, millivolts: u16) -> SportPacket {
        let raw = millivolts / 2;
        legacy(ids::VOLTS_ID, ((raw & 0x00FF) << 8) | (index << 4) | (raw >> 8))
    }

    fn cells_packet(cells: u32, index: u32, first: u32, second: u32) -> SportPacket {
        let data = (cells << 4) + index + (((first * 5) & 0xFFF) << 8) + (((second * 5) & 0xFFF) << 20);
        sealed(0xA1, CELLS_FIRST_ID, data)
    }

    #[test]
    fn test_mixed_legacy_and_extended_stream() {
        let mut session = TelemetrySession::default();
        let mut link = streaming();
        let packets = [
            // No fix yet: GPS speed is discarded
            legacy(ids::GPS_SPEED_BP_ID, 40),
            legacy(ids::GPS_LAT_BP_ID, 4530),
            legacy(ids::GPS_LAT_AP_ID, 1234),
            legacy(ids::GPS_LONG_BP_ID, 700),
            legacy(ids::GPS_LONG_AP_ID, 5678),
            legacy(ids::GPS_SPEED_BP_ID, 12),
            legacy(ids::GPS_ALT_BP_ID, 250),
            legacy(ids::GPS_ALT_AP_ID, 0),
            legacy(ids::FUEL_ID, 75),
            legacy_cell(0, 4100),
            legacy_cell(1, 3960),
            legacy_cell(2, 4200),
            sealed(0x98, FUEL_FIRST_ID, 85),
            cells_packet(3, 0, 410, 396),
            cells_packet(3, 2, 420, 0),
        ];

        for packet in &packets {
            assert!(process_sport_packet(&mut session, packet, &mut link));
        }

        let hub = session.hub();
        assert!(hub.gps_fix);
        assert_eq!(hub.gps_latitude_bp, 4530);
        assert_eq!(hub.gps_longitude_ap, 5678);
        assert_eq!(hub.gps_speed_bp, 12);
        assert_eq!(hub.max_gps_speed, 12);
        assert_eq!(hub.gps_altitude, 25_000);
        assert_ne!(hub.pilot_latitude, 0);
        assert_eq!(hub.fuel_level, 75);
        assert_eq!(hub.cells_count, 3);
        assert_eq!(hub.cells_sum, 1226);

        // Legacy identifiers never occupy sensor slots
        let readings = session.store().readings();
        assert_eq!(readings.len(), 2);
        let fuel = readings.iter().find(|reading| reading.label == "Fuel").unwrap();
        assert_eq!(fuel.value, 85);
        let cells = readings.iter().find(|reading| reading.label == "Cels").unwrap();
        assert_eq!(cells.value, 1226);
        assert_eq!(cells.min, 1226);
    }

    #[test]
    fn test_known_sensor_uses_descriptor() {
        let mut session = TelemetrySession::default();
        let mut link = streaming();

        process_sport_packet(&mut session, &sealed(0x22, 0x0210, 1180), &mut link);

        let sensor = &session.store().registry().sensors()[0];
        assert_eq!(sensor.label, "VFAS");
        assert_eq!(sensor.instance, 0x22);
        assert_eq!(session.store().item(0).unwrap().value, 1180);
    }

    #[test]
    fn test_unknown_sensor_is_raw() {
        let mut session = TelemetrySession::default();
        let mut link = streaming();

        process_sport_packet(&mut session, &sealed(0x22, 0x5A01, (-7i32) as u32), &mut link);

        let sensor = &session.store().registry().sensors()[0];
        assert_eq!(sensor.label, "5A01");
        assert_eq!(sensor.unit, TelemetryUnit::Raw);
        assert_eq!(session.store().item(0).unwrap().value, -7);
    }
}
