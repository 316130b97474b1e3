//! # Meter Polling
//!
//! A meter round trip is spread over several scheduler ticks so no single
//! tick blocks for more than one read. Each call to [`Poller::poll_tick`]
//! performs exactly one phase:
//!
//! | Counter | Phase | Action |
//! |---|---|---|
//! | 0 | `RequestCurrent` | hold power, send the current values request |
//! | 1 | `ReadCurrent` | read the answer, cache and notify on success, release power |
//! | 2 | `RequestEnergy` | hold power, send the energy request |
//! | 3 | `ReadEnergy` | read the answer, cache and notify on success, release power |
//! | 4 | `ReadAuxSensor` | only with an aux sensor attached |
//! | last | `Complete` | stop the tick timer, reset, send the reports |
//!
//! The counter advances on every tick whatever the outcome; a failed read
//! leaves the previous cached values in place.

use crate::constants::{
    ATTRID_ELECTRICAL_ACTIVE_POWER, ATTRID_ELECTRICAL_RMS_CURRENT, ATTRID_ELECTRICAL_RMS_VOLTAGE,
    ATTRID_SE_METERING_TIERS, ATTRID_TEMPERATURE_MEASURED_VALUE, CLUSTER_ELECTRICAL,
    CLUSTER_SE_METERING, CLUSTER_TEMPERATURE, POLL_PERIOD, REPORT_ENDPOINT,
};
use crate::error::MeterError;
use crate::logging::log_warn;
use crate::mercury::driver::MeterDriver;
use crate::mercury::frame::{CurrentValues, EnergyReading, MeterAddress, MeterCommand};
use crate::report::{electrical_report, metering_report, temperature_report, ReportSink};
use crate::scheduler::{AppEvent, ManualScheduler, PowerHint, Scheduler};
use crate::sensor::AuxSensor;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One step of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    RequestCurrent,
    ReadCurrent,
    RequestEnergy,
    ReadEnergy,
    ReadAuxSensor,
    Complete,
}

impl PollPhase {
    /// Map the phase counter to a phase. Any counter past the last read
    /// phase is terminal.
    pub fn from_counter(counter: u8, has_aux: bool) -> PollPhase {
        match counter {
            0 => PollPhase::RequestCurrent,
            1 => PollPhase::ReadCurrent,
            2 => PollPhase::RequestEnergy,
            3 => PollPhase::ReadEnergy,
            4 if has_aux => PollPhase::ReadAuxSensor,
            _ => PollPhase::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollState {
    /// Incremented on every tick, reset by the terminal phase
    pub counter: u8,
    /// Set by `start_cycle`, cleared by the terminal phase
    pub active: bool,
}

/// Last known good readings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedReading {
    pub current: CurrentValues,
    pub energy: EnergyReading,
    /// 0.01 °C
    pub aux_temperature: Option<i16>,
    pub current_updated: Option<DateTime<Utc>>,
    pub energy_updated: Option<DateTime<Utc>>,
    pub aux_updated: Option<DateTime<Utc>>,
}

/// Drives one meter through request/read phases.
pub struct Poller<D: MeterDriver> {
    driver: D,
    address: MeterAddress,
    state: PollState,
    cache: CachedReading,
    aux: Option<Box<dyn AuxSensor>>,
    poll_period: Duration,
}

impl<D: MeterDriver> Poller<D> {
    pub fn new(driver: D, address: MeterAddress) -> Self {
        log::info!("Polling {} meter {address}", driver.model());
        Poller {
            driver,
            address,
            state: PollState::default(),
            cache: CachedReading::default(),
            aux: None,
            poll_period: POLL_PERIOD,
        }
    }

    /// Attach a sensor read in an extra phase after the energy read.
    pub fn with_aux_sensor(mut self, sensor: Box<dyn AuxSensor>) -> Self {
        log::info!("Auxiliary sensor: {}", sensor.name());
        self.aux = Some(sensor);
        self
    }

    /// Interval between two phases. Defaults to `POLL_PERIOD`.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Arm the tick timer for a new cycle.
    ///
    /// Fails with `PollInProgress` while a cycle is still running; the
    /// running cycle is left untouched.
    pub fn start_cycle(&mut self, scheduler: &mut dyn Scheduler) -> Result<(), MeterError> {
        if self.state.active {
            return Err(MeterError::PollInProgress);
        }
        self.state = PollState {
            counter: 0,
            active: true,
        };
        scheduler.schedule_repeating(AppEvent::ReadSensors, self.poll_period);
        log::debug!("Poll cycle started for meter {}", self.address);
        Ok(())
    }

    /// Run one phase and return it.
    ///
    /// Returns `None` without touching the transport or the cache when no
    /// cycle is active, e.g. for a tick that was already queued when the
    /// previous cycle completed.
    pub async fn poll_tick(
        &mut self,
        scheduler: &mut dyn Scheduler,
        sink: &mut dyn ReportSink,
    ) -> Option<PollPhase> {
        if !self.state.active {
            log::trace!("Poll tick without an active cycle ignored");
            return None;
        }

        let phase = PollPhase::from_counter(self.state.counter, self.aux.is_some());
        self.state.counter = self.state.counter.wrapping_add(1);
        log::trace!("Poll phase {phase:?}");

        match phase {
            PollPhase::RequestCurrent => {
                scheduler.power_hint(PowerHint::Hold);
                self.request(MeterCommand::CurrentValues).await;
            }
            PollPhase::ReadCurrent => {
                let values = self.driver.read_current_values().await;
                if values.is_valid() {
                    self.cache.current = values;
                    self.cache.current_updated = Some(Utc::now());
                    for attribute in [
                        ATTRID_ELECTRICAL_RMS_VOLTAGE,
                        ATTRID_ELECTRICAL_RMS_CURRENT,
                        ATTRID_ELECTRICAL_ACTIVE_POWER,
                    ] {
                        sink.notify_changed(REPORT_ENDPOINT, CLUSTER_ELECTRICAL, attribute);
                    }
                    log::debug!(
                        "U={} I={} P={}",
                        values.voltage,
                        values.current,
                        values.power
                    );
                }
                scheduler.power_hint(PowerHint::Conserve);
            }
            PollPhase::RequestEnergy => {
                scheduler.power_hint(PowerHint::Hold);
                self.request(MeterCommand::Energy).await;
            }
            PollPhase::ReadEnergy => {
                let energy = self.driver.read_energy().await;
                if energy.is_valid() {
                    self.cache.energy = energy;
                    self.cache.energy_updated = Some(Utc::now());
                    for attribute in ATTRID_SE_METERING_TIERS {
                        sink.notify_changed(REPORT_ENDPOINT, CLUSTER_SE_METERING, attribute);
                    }
                    log::debug!("Tariffs {:?}", energy.tariffs);
                }
                scheduler.power_hint(PowerHint::Conserve);
            }
            PollPhase::ReadAuxSensor => {
                if let Some(sensor) = self.aux.as_mut() {
                    match sensor.read_temperature().await {
                        Ok(temperature) => {
                            self.cache.aux_temperature = Some(temperature);
                            self.cache.aux_updated = Some(Utc::now());
                            sink.notify_changed(
                                REPORT_ENDPOINT,
                                CLUSTER_TEMPERATURE,
                                ATTRID_TEMPERATURE_MEASURED_VALUE,
                            );
                        }
                        Err(e) => log::warn!("{} read failed: {e}", sensor.name()),
                    }
                }
            }
            PollPhase::Complete => {
                scheduler.cancel(AppEvent::ReadSensors);
                self.state = PollState::default();
                self.send_reports(sink);
                log::debug!("Poll cycle complete for meter {}", self.address);
            }
        }

        Some(phase)
    }

    /// Run a whole cycle back to back, without a timer.
    ///
    /// Each read still waits for the meter up to the driver's read timeout.
    pub async fn run_cycle(
        &mut self,
        sink: &mut dyn ReportSink,
    ) -> Result<&CachedReading, MeterError> {
        let mut scheduler = ManualScheduler::new();
        self.start_cycle(&mut scheduler)?;
        while self.state.active {
            self.poll_tick(&mut scheduler, sink).await;
        }
        Ok(&self.cache)
    }

    async fn request(&mut self, command: MeterCommand) {
        if let Err(e) = self.driver.request_measure(self.address, command).await {
            log_warn(&format!(
                "{command:?} request to meter {} failed: {e}",
                self.address
            ));
        }
    }

    fn send_reports(&self, sink: &mut dyn ReportSink) {
        let mut reports = vec![
            electrical_report(&self.cache.current),
            metering_report(&self.cache.energy),
        ];
        if let Some(temperature) = self.cache.aux_temperature {
            reports.push(temperature_report(temperature));
        }
        for report in &reports {
            if let Err(e) = sink.send_report(report) {
                log::warn!("Report for cluster 0x{:04X} failed: {e}", report.cluster);
            }
        }
    }

    pub fn cache(&self) -> &CachedReading {
        &self.cache
    }

    pub fn current_values(&self) -> CurrentValues {
        self.cache.current
    }

    pub fn energy(&self) -> EnergyReading {
        self.cache.energy
    }

    pub fn aux_temperature(&self) -> Option<i16> {
        self.cache.aux_temperature
    }

    /// Phase the next tick will run.
    pub fn phase(&self) -> PollPhase {
        PollPhase::from_counter(self.state.counter, self.aux.is_some())
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn address(&self) -> MeterAddress {
        self.address
    }

    /// Takes effect with the next request phase.
    pub fn set_address(&mut self, address: MeterAddress) {
        self.address = address;
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mercury::driver::Mercury200;
    use crate::mercury::frame::build_request;
    use crate::mercury::serial_mock::MockSerialPort;
    use crate::report::RecordingSink;

    const ADDR: u32 = 0x0A98_7654;
    const CV_PAYLOAD: [u8; 7] = [0x23, 0x05, 0x01, 0x23, 0x00, 0x12, 0x34];
    const E_PAYLOAD: [u8; 16] = [
        0x00, 0x12, 0x34, 0x56, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x99, 0x12, 0x34, 0x56,
        0x78,
    ];

    fn poller(mock: &MockSerialPort) -> Poller<Mercury200<MockSerialPort>> {
        Poller::new(
            Mercury200::new(mock.clone(), Duration::from_millis(20)),
            MeterAddress(ADDR),
        )
    }

    #[test]
    fn test_phase_mapping() {
        assert_eq!(PollPhase::from_counter(0, false), PollPhase::RequestCurrent);
        assert_eq!(PollPhase::from_counter(4, false), PollPhase::Complete);
        assert_eq!(PollPhase::from_counter(4, true), PollPhase::ReadAuxSensor);
        assert_eq!(PollPhase::from_counter(5, true), PollPhase::Complete);
        assert_eq!(PollPhase::from_counter(200, false), PollPhase::Complete);
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let mock = MockSerialPort::new();
        mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
        mock.queue_response(ADDR, 0x27, &E_PAYLOAD);
        let mut poller = poller(&mock);
        let mut scheduler = ManualScheduler::new();
        let mut sink = RecordingSink::new();

        poller.start_cycle(&mut scheduler).unwrap();
        assert_eq!(scheduler.repeating.get(&AppEvent::ReadSensors), Some(&POLL_PERIOD));

        let mut phases = Vec::new();
        for _ in 0..5 {
            phases.push(poller.poll_tick(&mut scheduler, &mut sink).await.unwrap());
        }
        assert_eq!(
            phases,
            vec![
                PollPhase::RequestCurrent,
                PollPhase::ReadCurrent,
                PollPhase::RequestEnergy,
                PollPhase::ReadEnergy,
                PollPhase::Complete,
            ]
        );

        assert_eq!(
            mock.tx_frames(),
            vec![build_request(ADDR, 0x63).to_vec(), build_request(ADDR, 0x27).to_vec()]
        );
        assert_eq!(
            poller.current_values(),
            CurrentValues { voltage: 2305, current: 123, power: 1234 }
        );
        assert_eq!(poller.energy().tariffs, [123_456, 10_000, 99, 12_345_678]);

        assert!(!poller.is_active());
        assert_eq!(poller.phase(), PollPhase::RequestCurrent);
        assert!(!scheduler.is_armed(AppEvent::ReadSensors));
        assert_eq!(scheduler.cancelled, vec![AppEvent::ReadSensors]);
        assert_eq!(
            scheduler.hints,
            vec![PowerHint::Hold, PowerHint::Conserve, PowerHint::Hold, PowerHint::Conserve]
        );

        assert_eq!(sink.notifications.len(), 7);
        assert_eq!(sink.reports.len(), 2);
        assert_eq!(sink.reports[0].cluster, CLUSTER_ELECTRICAL);
        assert_eq!(sink.reports[1].cluster, CLUSTER_SE_METERING);
    }

    #[tokio::test]
    async fn test_tick_after_complete_is_noop() {
        let mock = MockSerialPort::new();
        let mut poller = poller(&mock);
        let mut scheduler = ManualScheduler::new();
        let mut sink = RecordingSink::new();

        assert_eq!(poller.poll_tick(&mut scheduler, &mut sink).await, None);
        assert!(mock.tx_frames().is_empty());
        assert!(scheduler.hints.is_empty());
        assert_eq!(poller.cache(), &CachedReading::default());
    }

    #[tokio::test]
    async fn test_start_cycle_refused_while_active() {
        let mock = MockSerialPort::new();
        let mut poller = poller(&mock);
        let mut scheduler = ManualScheduler::new();
        let mut sink = RecordingSink::new();

        poller.start_cycle(&mut scheduler).unwrap();
        poller.poll_tick(&mut scheduler, &mut sink).await;

        assert!(matches!(
            poller.start_cycle(&mut scheduler),
            Err(MeterError::PollInProgress)
        ));
        assert_eq!(poller.phase(), PollPhase::ReadCurrent);
    }

    #[tokio::test]
    async fn test_failed_reads_keep_cache() {
        let mock = MockSerialPort::new();
        mock.queue_corrupted_response(ADDR, 0x63, &CV_PAYLOAD);
        mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
        let mut poller = poller(&mock);
        let mut sink = RecordingSink::new();

        poller.run_cycle(&mut sink).await.unwrap();

        // Corrupted frame plus the resync read, then a silent meter for energy
        assert_eq!(poller.current_values(), CurrentValues::default());
        assert_eq!(poller.energy(), EnergyReading::default());
        assert!(poller.cache().current_updated.is_none());
        assert!(sink.notifications.is_empty());
        assert_eq!(sink.reports.len(), 2);
    }

    struct FixedSensor(Result<i16, ()>);

    #[async_trait::async_trait]
    impl AuxSensor for FixedSensor {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn read_temperature(&mut self) -> Result<i16, MeterError> {
            self.0
                .map_err(|_| MeterError::SensorError("unplugged".to_string()))
        }
    }

    #[tokio::test]
    async fn test_aux_sensor_phase() {
        let mock = MockSerialPort::new();
        mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
        mock.queue_response(ADDR, 0x27, &E_PAYLOAD);
        let mut poller = poller(&mock).with_aux_sensor(Box::new(FixedSensor(Ok(2150))));
        let mut scheduler = ManualScheduler::new();
        let mut sink = RecordingSink::new();

        poller.start_cycle(&mut scheduler).unwrap();
        let mut last = None;
        for _ in 0..6 {
            last = poller.poll_tick(&mut scheduler, &mut sink).await;
        }

        assert_eq!(last, Some(PollPhase::Complete));
        assert_eq!(poller.aux_temperature(), Some(2150));
        assert_eq!(sink.reports.len(), 3);
        assert_eq!(sink.reports[2].cluster, CLUSTER_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_aux_sensor_failure_keeps_cache() {
        let mock = MockSerialPort::new();
        let mut poller = poller(&mock).with_aux_sensor(Box::new(FixedSensor(Err(()))));
        let mut sink = RecordingSink::new();

        poller.run_cycle(&mut sink).await.unwrap();
        assert_eq!(poller.aux_temperature(), None);
        assert_eq!(sink.reports.len(), 2);
    }

    #[tokio::test]
    async fn test_set_address_applies_to_next_request() {
        let mock = MockSerialPort::new();
        let mut poller = poller(&mock);
        poller.set_address(MeterAddress(42));
        let mut sink = RecordingSink::new();

        poller.run_cycle(&mut sink).await.unwrap();
        assert_eq!(mock.tx_frames()[0], build_request(42, 0x63).to_vec());
    }
}
