//! Event kind discriminants and service names

use std::fmt;

/// Discriminant of the `Event` union.
///
/// Kept as an open newtype: logs written by newer producers may carry kinds this
/// crate has no name for, and those still load and sort like any other event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKind(pub u16);

macro_rules! event_kinds {
    ($($konst:ident = $value:literal => $name:literal),* $(,)?) => {
        impl EventKind {
            $(pub const $konst: EventKind = EventKind($value);)*

            /// Every kind with a known service name, in discriminant order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$konst),*];

            /// Service name used by allow and block lists.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some($name),)*
                    _ => None,
                }
            }

            /// Look up a kind by service name.
            pub fn from_name(name: &str) -> Option<EventKind> {
                match name {
                    $($name => Some(EventKind($value)),)*
                    _ => None,
                }
            }
        }
    };
}

// Values are positions within the producer's `Event` union in ordinal order.
// Gaps belong to services the loader has no name for.
event_kinds! {
    INIT_DATA = 0 => "initData",
    ROAD_CAMERA_STATE = 1 => "roadCameraState",
    CAN = 4 => "can",
    DEVICE_STATE = 5 => "deviceState",
    CONTROLS_STATE = 6 => "controlsState",
    RADAR_STATE = 12 => "radarState",
    ROAD_ENCODE_IDX = 14 => "roadEncodeIdx",
    SENDCAN = 16 => "sendcan",
    LOG_MESSAGE = 17 => "logMessage",
    LIVE_CALIBRATION = 18 => "liveCalibration",
    CAR_STATE = 21 => "carState",
    CAR_CONTROL = 22 => "carControl",
    LONGITUDINAL_PLAN = 23 => "longitudinalPlan",
    GPS_LOCATION_EXTERNAL = 47 => "gpsLocationExternal",
    LIVE_PARAMETERS = 60 => "liveParameters",
    THUMBNAIL = 65 => "thumbnail",
    CAR_PARAMS = 67 => "carParams",
    DRIVER_CAMERA_STATE = 68 => "driverCameraState",
    DRIVER_MONITORING_STATE = 69 => "driverMonitoringState",
    WIDE_ROAD_CAMERA_STATE = 72 => "wideRoadCameraState",
    MODEL_V2 = 73 => "modelV2",
    DRIVER_ENCODE_IDX = 74 => "driverEncodeIdx",
    WIDE_ROAD_ENCODE_IDX = 75 => "wideRoadEncodeIdx",
    MANAGER_STATE = 76 => "managerState",
    PANDA_STATES = 79 => "pandaStates",
    ERROR_LOG_MESSAGE = 83 => "errorLogMessage",
    Q_ROAD_ENCODE_IDX = 88 => "qRoadEncodeIdx",
    USER_BOOKMARK = 91 => "userBookmark",
    UI_DEBUG = 100 => "uiDebug",
    SELFDRIVE_STATE = 128 => "selfdriveState",
}

impl EventKind {
    /// Camera encode-index kinds that carry full-resolution frame metadata.
    pub fn is_frame_index(self) -> bool {
        matches!(
            self,
            EventKind::ROAD_ENCODE_IDX | EventKind::DRIVER_ENCODE_IDX | EventKind::WIDE_ROAD_ENCODE_IDX
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for &kind in EventKind::ALL {
            let name = kind.name().unwrap();
            assert_eq!(EventKind::from_name(name), Some(kind));
        }
        assert_eq!(EventKind::from_name("roadEncodeIdx"), Some(EventKind::ROAD_ENCODE_IDX));
        assert_eq!(EventKind::from_name("noSuchService"), None);
    }

    #[test]
    fn discriminants_are_ordered() {
        assert!(EventKind::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn discriminants_match_union_positions() {
        assert_eq!(EventKind::CAN, EventKind(4));
        assert_eq!(EventKind::DEVICE_STATE, EventKind(5));
        assert_eq!(EventKind::CONTROLS_STATE, EventKind(6));
        assert_eq!(EventKind::ROAD_ENCODE_IDX, EventKind(14));
        assert_eq!(EventKind::SELFDRIVE_STATE, EventKind(128));
        assert_eq!(EventKind(2).name(), None);
    }

    #[test]
    fn unknown_kinds_display_their_value() {
        assert_eq!(EventKind(900).to_string(), "unknown(900)");
        assert_eq!(EventKind::CONTROLS_STATE.to_string(), "controlsState");
    }

    #[test]
    fn only_full_resolution_cameras_are_frame_indexes() {
        assert!(EventKind::ROAD_ENCODE_IDX.is_frame_index());
        assert!(EventKind::DRIVER_ENCODE_IDX.is_frame_index());
        assert!(EventKind::WIDE_ROAD_ENCODE_IDX.is_frame_index());
        assert!(!EventKind::Q_ROAD_ENCODE_IDX.is_frame_index());
        assert!(!EventKind::CAN.is_frame_index());
    }
}
