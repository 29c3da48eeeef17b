//! # Input Poller Module
//!
//! Pulls raw reports from the adapter and turns them into [`InputState`]
//! snapshots using an [`AxisMap`].
//!
//! ## Session Lifecycle
//!
//! | From | Call | To |
//! |------|------|----|
//! | Uninitialized | `start` / `start_first` | Ready |
//! | Ready | `read` | Ready |
//! | Ready | `stop` | Uninitialized |
//! | any | `enable_raw_reading` | Raw |
//! | Raw | `read_raw_values` | Raw |
//! | Raw | `disable_raw_reading` | Uninitialized |
//!
//! Only one adapter is open at a time; starting a session or enabling raw
//! reading releases whatever was open before.
//!
//! ## Read Cycle
//!
//! 1. `pitchcal` and `rollcal` are cleared (one-shot fields)
//! 2. One report is bulk-read from the adapter
//! 3. Each byte with an `Input.AXIS` entry is normalized and stored
//! 4. The last-event timestamp is updated
//! 5. On the first read after `start`, roll/pitch/yaw/thrust are forced to 0.0
//!
//! ## Usage
//!
//! ```no_run
//! use phoenix_usb_reader::input::axis_map::AxisMap;
//! use phoenix_usb_reader::input::poller::InputPoller;
//! use phoenix_usb_reader::usb::RusbBus;
//!
//! let axis_map = AxisMap::load("config/axis_map.json")?;
//! let mut poller = InputPoller::new(RusbBus::default());
//! poller.start_first(axis_map)?;
//!
//! loop {
//!     let state = poller.read()?;
//!     println!("roll={} pitch={}", state.roll, state.pitch);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::axis_map::{AxisKind, AxisMap};
use super::normalize::normalize_axis;
use super::state::{InputState, RawValues};
use crate::error::{PhoenixError, Result};
use crate::usb::transport_trait::{ReportSource, UsbBus};
use crate::usb::DeviceInfo;

/// State of one mapped reading session.
#[derive(Debug)]
struct PollerSession<H> {
    handle: H,
    device: DeviceInfo,
    axis_map: AxisMap,
    state: InputState,
    first_time_opened: bool,
    last_event: DateTime<Utc>,
    report: Vec<u8>,
}

/// Which mode the adapter is open in.
#[derive(Debug)]
enum Link<H> {
    Closed,
    Mapped(PollerSession<H>),
    Raw { handle: H, report: Vec<u8> },
}

/// Single-device reader turning adapter reports into control inputs.
///
/// # Thread Safety
///
/// `InputPoller` is not thread-safe. Use from a single task/thread only;
/// `read` blocks until the adapter answers or the read times out.
pub struct InputPoller<B: UsbBus> {
    bus: B,
    link: Link<B::Handle>,
}

impl<B: UsbBus> InputPoller<B> {
    /// Creates a poller with no device open.
    #[must_use]
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            link: Link::Closed,
        }
    }

    /// Lists attached adapters.
    pub fn available_devices(&self) -> Vec<DeviceInfo> {
        self.bus.enumerate()
    }

    /// Opens `device` and starts a mapped session with all inputs zeroed.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` if the adapter cannot be opened or claimed.
    pub fn start(&mut self, device: &DeviceInfo, axis_map: AxisMap) -> Result<()> {
        self.close()?;

        let handle = self.bus.open(device)?;
        let report = vec![0u8; handle.max_packet_size()];
        info!(
            "Started input reading on device {} ({} mapped offsets)",
            device.name,
            axis_map.len()
        );

        self.link = Link::Mapped(PollerSession {
            handle,
            device: device.clone(),
            axis_map,
            state: InputState::default(),
            first_time_opened: true,
            last_event: Utc::now(),
            report,
        });
        Ok(())
    }

    /// Starts a mapped session on the first attached adapter.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no adapter is attached, otherwise as [`start`](Self::start).
    pub fn start_first(&mut self, axis_map: AxisMap) -> Result<DeviceInfo> {
        let device = self
            .bus
            .enumerate()
            .into_iter()
            .next()
            .ok_or(PhoenixError::DeviceNotFound)?;
        self.start(&device, axis_map)?;
        Ok(device)
    }

    /// Reads one report and returns the updated snapshot.
    ///
    /// The calibration fields are cleared before the bulk read, so a failed
    /// read still leaves them at 0.0.
    ///
    /// # Errors
    ///
    /// - `NotStarted`: no mapped session is active
    /// - `TransportRead`: the bulk read failed or timed out; the session stays usable
    pub fn read(&mut self) -> Result<InputState> {
        let Link::Mapped(session) = &mut self.link else {
            return Err(PhoenixError::NotStarted);
        };

        session.state.reset_calibration();

        let len = session.handle.bulk_read(&mut session.report)?;

        for (index, &byte) in session.report[..len].iter().enumerate() {
            let Some(entry) = session.axis_map.try_get(index) else {
                continue;
            };
            if entry.kind != AxisKind::Axis {
                continue;
            }
            session.state.set_axis(entry.key, normalize_axis(byte, entry.scale));
        }

        session.last_event = Utc::now();

        // The first report after claiming the interface often has every axis maxed out.
        if session.first_time_opened {
            debug!("Discarding first report from device {}", session.device.name);
            session.state.zero_flight_axes();
            session.first_time_opened = false;
        }

        Ok(session.state)
    }

    /// Ends the mapped session and releases the adapter.
    ///
    /// # Errors
    ///
    /// Returns `DeviceRelease` if the interface could not be released.
    pub fn stop(&mut self) -> Result<()> {
        if matches!(self.link, Link::Mapped(_)) {
            self.close()?;
        }
        Ok(())
    }

    /// Opens `device` for unmapped reading. Ends any mapped session.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` if the adapter cannot be opened or claimed.
    pub fn enable_raw_reading(&mut self, device: &DeviceInfo) -> Result<()> {
        self.close()?;

        let handle = self.bus.open(device)?;
        let report = vec![0u8; handle.max_packet_size()];
        info!("Enabled raw reading on device {}", device.name);
        self.link = Link::Raw { handle, report };
        Ok(())
    }

    /// Reads one report without mapping, scaling or first-read suppression.
    ///
    /// # Errors
    ///
    /// - `NotStarted`: raw reading is not enabled
    /// - `TransportRead`: the bulk read failed or timed out
    pub fn read_raw_values(&mut self) -> Result<RawValues> {
        let Link::Raw { handle, report } = &mut self.link else {
            return Err(PhoenixError::NotStarted);
        };

        let len = handle.bulk_read(report)?;
        Ok(RawValues::from_report(&report[..len]))
    }

    /// Releases the adapter opened by [`enable_raw_reading`](Self::enable_raw_reading).
    ///
    /// # Errors
    ///
    /// Returns `DeviceRelease` if the interface could not be released.
    pub fn disable_raw_reading(&mut self) -> Result<()> {
        if matches!(self.link, Link::Raw { .. }) {
            self.close()?;
        }
        Ok(())
    }

    /// Returns `true` while a mapped session is active.
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self.link, Link::Mapped(_))
    }

    /// Returns `true` while raw reading is enabled.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        matches!(self.link, Link::Raw { .. })
    }

    /// Latest snapshot without reading, if a mapped session is active.
    #[must_use]
    pub fn state(&self) -> Option<&InputState> {
        match &self.link {
            Link::Mapped(session) => Some(&session.state),
            _ => None,
        }
    }

    /// Time of the last successful read (or of `start` before the first one).
    #[must_use]
    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        match &self.link {
            Link::Mapped(session) => Some(session.last_event),
            _ => None,
        }
    }

    /// Device of the active mapped session.
    #[must_use]
    pub fn device(&self) -> Option<&DeviceInfo> {
        match &self.link {
            Link::Mapped(session) => Some(&session.device),
            _ => None,
        }
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.link, Link::Closed) {
            Link::Closed => Ok(()),
            Link::Mapped(mut session) => {
                info!("Stopped input reading on device {}", session.device.name);
                session.handle.release()
            }
            Link::Raw { mut handle, .. } => {
                info!("Disabled raw reading");
                handle.release()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::axis_map::AxisMapEntry;
    use crate::input::state::InputKey;
    use crate::usb::transport_trait::mocks::{phoenix_device, scripted_source, MockUsbBus};
    use crate::usb::transport_trait::MockReportSource;

    const SCALE: f32 = 1.0 / 128.0;

    fn roll_map(scale: f32) -> AxisMap {
        [(0, AxisMapEntry::axis(InputKey::Roll, scale))]
            .into_iter()
            .collect()
    }

    fn full_map() -> AxisMap {
        [
            (0, AxisMapEntry::axis(InputKey::Roll, SCALE)),
            (1, AxisMapEntry::axis(InputKey::Pitch, SCALE)),
            (2, AxisMapEntry::axis(InputKey::Thrust, SCALE)),
            (3, AxisMapEntry::axis(InputKey::Yaw, SCALE)),
            (4, AxisMapEntry::axis(InputKey::PitchCal, SCALE)),
            (5, AxisMapEntry::axis(InputKey::RollCal, SCALE)),
        ]
        .into_iter()
        .collect()
    }

    fn started(reports: Vec<Vec<u8>>, axis_map: AxisMap) -> InputPoller<MockUsbBus> {
        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(scripted_source(reports));
        let mut poller = InputPoller::new(bus);
        poller.start_first(axis_map).unwrap();
        poller
    }

    #[test]
    fn test_read_before_start_is_not_started() {
        let mut poller = InputPoller::new(MockUsbBus::default());
        assert!(matches!(poller.read(), Err(PhoenixError::NotStarted)));
        assert!(matches!(poller.read_raw_values(), Err(PhoenixError::NotStarted)));
        assert!(poller.state().is_none());
    }

    #[test]
    fn test_start_first_without_device() {
        let mut poller = InputPoller::new(MockUsbBus::default());
        assert!(matches!(
            poller.start_first(AxisMap::new()),
            Err(PhoenixError::DeviceNotFound)
        ));
        assert!(!poller.is_started());
    }

    #[test]
    fn test_start_open_failure_leaves_poller_uninitialized() {
        // No handle queued, so open fails
        let mut poller = InputPoller::new(MockUsbBus::new(vec![phoenix_device(4)]));
        assert!(matches!(
            poller.start(&phoenix_device(4), AxisMap::new()),
            Err(PhoenixError::DeviceOpen(_))
        ));
        assert!(!poller.is_started());
    }

    #[test]
    fn test_start_resets_state() {
        let poller = started(vec![], full_map());
        assert!(poller.is_started());
        assert_eq!(poller.state(), Some(&InputState::default()));
        assert!(poller.last_event().is_some());
        assert_eq!(poller.device().map(|device| device.name.as_str()), Some("4"));
    }

    #[test]
    fn test_first_read_is_suppressed() {
        let report = vec![255, 0, 255, 0, 128, 128, 0, 0];
        let mut poller = started(vec![report.clone(), report], full_map());

        let first = poller.read().unwrap();
        assert_eq!((first.roll, first.pitch, first.yaw, first.thrust), (0.0, 0.0, 0.0, 0.0));

        let second = poller.read().unwrap();
        assert_eq!(second.roll, 0.9921875);
        assert_eq!(second.pitch, -1.0);
        assert_eq!(second.thrust, 0.9921875);
        assert_eq!(second.yaw, -1.0);
    }

    #[test]
    fn test_first_read_keeps_calibration() {
        let report = vec![255, 255, 255, 255, 192, 64, 0, 0];
        let mut poller = started(vec![report], full_map());

        let first = poller.read().unwrap();
        assert_eq!(first.roll, 0.0);
        assert_eq!(first.pitchcal, 0.5);
        assert_eq!(first.rollcal, -0.5);
    }

    #[test]
    fn test_roll_scenario_near_full_deflection() {
        let report = vec![255, 0, 0, 0, 0, 0, 0, 0];
        let mut poller = started(vec![report.clone(), report], roll_map(SCALE));

        poller.read().unwrap();
        let state = poller.read().unwrap();
        assert!((state.roll - 0.992).abs() < 0.001);
        assert_eq!(state.roll, 0.9921875);
    }

    #[test]
    fn test_roll_scenario_lower_bound() {
        let report = vec![0; 8];
        let mut poller = started(vec![report.clone(), report], roll_map(SCALE));

        poller.read().unwrap();
        assert_eq!(poller.read().unwrap().roll, -1.0);
    }

    #[test]
    fn test_roll_scenario_clamped() {
        let report = vec![255, 0, 0, 0, 0, 0, 0, 0];
        let mut poller = started(vec![report.clone(), report], roll_map(1.0));

        poller.read().unwrap();
        assert_eq!(poller.read().unwrap().roll, 1.0);
    }

    #[test]
    fn test_calibration_is_one_shot() {
        let with_cal = vec![128, 128, 128, 128, 255, 0, 0, 0];
        // Too short to reach the calibration offsets
        let without_cal = vec![128, 128, 128, 128];
        let mut poller = started(vec![with_cal.clone(), with_cal, without_cal], full_map());

        poller.read().unwrap();
        let second = poller.read().unwrap();
        assert_eq!(second.pitchcal, 0.9921875);
        assert_eq!(second.rollcal, -1.0);

        let third = poller.read().unwrap();
        assert_eq!(third.pitchcal, 0.0);
        assert_eq!(third.rollcal, 0.0);
    }

    #[test]
    fn test_unmapped_offsets_do_not_touch_state() {
        let report = vec![255, 10, 20, 30, 40, 50, 60, 70];
        let mut poller = started(vec![report.clone(), report], roll_map(SCALE));

        poller.read().unwrap();
        let state = poller.read().unwrap();
        assert_eq!(
            state,
            InputState {
                roll: 0.9921875,
                ..InputState::default()
            }
        );
    }

    #[test]
    fn test_button_entries_are_ignored_by_axis_path() {
        let mut map = AxisMap::new();
        map.insert(
            0,
            AxisMapEntry {
                kind: AxisKind::Button,
                key: InputKey::Roll,
                scale: 1.0,
            },
        );
        let report = vec![255; 8];
        let mut poller = started(vec![report.clone(), report], map);

        poller.read().unwrap();
        assert_eq!(poller.read().unwrap().roll, 0.0);
    }

    #[test]
    fn test_axis_values_persist_between_reads() {
        let mut poller = started(
            vec![vec![0; 8], vec![255, 0, 0, 0, 0, 0, 0, 0], vec![]],
            roll_map(SCALE),
        );

        poller.read().unwrap();
        assert_eq!(poller.read().unwrap().roll, 0.9921875);
        // Empty report maps nothing; the last roll value is kept
        assert_eq!(poller.read().unwrap().roll, 0.9921875);
    }

    #[test]
    fn test_failed_read_surfaces_and_session_survives() {
        let mut source = MockReportSource::new();
        source.expect_max_packet_size().return_const(8usize);
        let mut calls = 0;
        source.expect_bulk_read().returning(move |buf| {
            calls += 1;
            match calls {
                2 => Err(PhoenixError::TransportRead("Mock timeout".to_string())),
                _ => {
                    buf.fill(0);
                    buf[4] = 255;
                    Ok(buf.len())
                }
            }
        });
        source.expect_release().returning(|| Ok(()));

        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(source);
        let mut poller = InputPoller::new(bus);
        poller.start_first(full_map()).unwrap();

        assert_eq!(poller.read().unwrap().pitchcal, 0.9921875);
        assert!(matches!(poller.read(), Err(PhoenixError::TransportRead(_))));

        // Calibration was cleared before the failed read
        let state = poller.state().copied().unwrap();
        assert_eq!(state.pitchcal, 0.0);
        assert!(poller.is_started());

        assert_eq!(poller.read().unwrap().pitchcal, 0.9921875);
    }

    #[test]
    fn test_failed_first_read_does_not_consume_suppression() {
        let mut source = MockReportSource::new();
        source.expect_max_packet_size().return_const(8usize);
        let mut calls = 0;
        source.expect_bulk_read().returning(move |buf| {
            calls += 1;
            if calls == 1 {
                return Err(PhoenixError::TransportRead("Mock timeout".to_string()));
            }
            buf.fill(255);
            Ok(buf.len())
        });

        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(source);
        let mut poller = InputPoller::new(bus);
        poller.start_first(roll_map(SCALE)).unwrap();

        assert!(poller.read().is_err());
        assert_eq!(poller.read().unwrap().roll, 0.0);
        assert_eq!(poller.read().unwrap().roll, 0.9921875);
    }

    #[test]
    fn test_returned_snapshot_is_isolated() {
        let mut poller = started(
            vec![vec![0; 8], vec![0; 8], vec![255, 0, 0, 0, 0, 0, 0, 0]],
            roll_map(SCALE),
        );

        poller.read().unwrap();
        let snapshot = poller.read().unwrap();
        poller.read().unwrap();
        assert_eq!(snapshot.roll, -1.0);
    }

    #[test]
    fn test_stop_releases_device() {
        let mut source = MockReportSource::new();
        source.expect_max_packet_size().return_const(8usize);
        source.expect_release().times(1).returning(|| Ok(()));

        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(source);
        let mut poller = InputPoller::new(bus);
        poller.start_first(AxisMap::new()).unwrap();

        poller.stop().unwrap();
        assert!(!poller.is_started());
        assert!(matches!(poller.read(), Err(PhoenixError::NotStarted)));

        // Already stopped, nothing to release
        poller.stop().unwrap();
    }

    #[test]
    fn test_restart_releases_previous_device() {
        let mut first = MockReportSource::new();
        first.expect_max_packet_size().return_const(8usize);
        first.expect_release().times(1).returning(|| Ok(()));

        let bus = MockUsbBus::new(vec![phoenix_device(4), phoenix_device(5)]);
        bus.push_handle(first);
        bus.push_handle(scripted_source(vec![]));
        let mut poller = InputPoller::new(bus.clone());

        poller.start(&phoenix_device(4), AxisMap::new()).unwrap();
        poller.start(&phoenix_device(5), AxisMap::new()).unwrap();

        assert_eq!(poller.device().map(|device| device.address), Some(5));
        assert_eq!(bus.opened().len(), 2);
    }

    #[test]
    fn test_raw_reading_returns_unprocessed_bytes() {
        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(scripted_source(vec![vec![255, 0, 17]]));
        let mut poller = InputPoller::new(bus);

        poller.enable_raw_reading(&phoenix_device(4)).unwrap();
        assert!(poller.is_raw());
        assert!(matches!(poller.read(), Err(PhoenixError::NotStarted)));

        let raw = poller.read_raw_values().unwrap();
        assert_eq!(raw.axes.into_iter().collect::<Vec<_>>(), vec![(0, 255), (1, 0), (2, 17)]);
        assert!(raw.buttons.is_empty());

        poller.disable_raw_reading().unwrap();
        assert!(!poller.is_raw());
        assert!(matches!(poller.read_raw_values(), Err(PhoenixError::NotStarted)));
    }

    #[test]
    fn test_raw_reading_ends_mapped_session() {
        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(scripted_source(vec![]));
        bus.push_handle(scripted_source(vec![vec![1, 2]]));
        let mut poller = InputPoller::new(bus);

        poller.start_first(roll_map(SCALE)).unwrap();
        poller.enable_raw_reading(&phoenix_device(4)).unwrap();
        assert!(!poller.is_started());
        assert_eq!(poller.read_raw_values().unwrap().axes.len(), 2);
    }

    #[test]
    fn test_release_failure_is_reported() {
        let mut source = MockReportSource::new();
        source.expect_max_packet_size().return_const(8usize);
        source
            .expect_release()
            .returning(|| Err(PhoenixError::DeviceRelease("Mock release error".to_string())));

        let bus = MockUsbBus::new(vec![phoenix_device(4)]);
        bus.push_handle(source);
        let mut poller = InputPoller::new(bus);
        poller.enable_raw_reading(&phoenix_device(4)).unwrap();

        assert!(matches!(
            poller.disable_raw_reading(),
            Err(PhoenixError::DeviceRelease(_))
        ));
        assert!(!poller.is_raw());
    }
}
