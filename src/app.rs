//! # Application
//!
//! [`MeterApp`] ties a [`Poller`] to its collaborators: timer events come in
//! through [`AppEvent`], readings go out through a [`ReportSink`], and the
//! configuration block lives in a [`ConfigStore`].
//!
//! Event handling:
//! - `Report` starts a poll cycle, unless one is still running;
//! - `ReadSensors` advances the running cycle by one phase;
//! - `SaveAttributes` persists the configuration and re-arms the report
//!   timer with the (possibly changed) measurement period.

use crate::config::{restore, AppConfig, ConfigStore};
use crate::constants::{ATTRID_CUSTOM_DEVICE_ADDRESS, SAVE_ATTRS_DELAY};
use crate::error::MeterError;
use crate::logging::log_error;
use crate::mercury::driver::MeterDriver;
use crate::poller::Poller;
use crate::report::{AttributeValue, ReportSink};
use crate::scheduler::{AppEvent, Scheduler, TokioScheduler};

pub struct MeterApp<D: MeterDriver, S: Scheduler, R: ReportSink, C: ConfigStore> {
    poller: Poller<D>,
    scheduler: S,
    sink: R,
    store: C,
    config: AppConfig,
}

impl<D, S, R, C> MeterApp<D, S, R, C>
where
    D: MeterDriver,
    S: Scheduler,
    R: ReportSink,
    C: ConfigStore,
{
    pub fn new(poller: Poller<D>, scheduler: S, sink: R, store: C) -> Self {
        MeterApp {
            poller,
            scheduler,
            sink,
            store,
            config: AppConfig::default(),
        }
    }

    /// Restore the configuration and arm the report timer.
    pub fn init(&mut self) -> Result<(), MeterError> {
        self.config = restore(&mut self.store)?;
        self.poller.set_address(self.config.device_address);
        self.arm_report_timer();
        Ok(())
    }

    pub async fn handle_event(&mut self, event: AppEvent) -> Result<(), MeterError> {
        log::trace!("Event {event:?} (0x{:04X})", event.id());
        match event {
            AppEvent::Report => self.start_report(),
            AppEvent::ReadSensors => {
                self.poller
                    .poll_tick(&mut self.scheduler, &mut self.sink)
                    .await;
                Ok(())
            }
            AppEvent::SaveAttributes => self.save_attributes(),
        }
    }

    /// Report right away, as the node's button does.
    pub fn key_press(&mut self) -> Result<(), MeterError> {
        self.start_report()
    }

    /// Apply a remote attribute write; the block is saved after a short delay
    /// so that several writes in a row end up in one save.
    pub fn write_attribute(&mut self, id: u16, value: AttributeValue) -> Result<(), MeterError> {
        self.config.write_attribute(id, value)?;
        if id == ATTRID_CUSTOM_DEVICE_ADDRESS {
            self.poller.set_address(self.config.device_address);
        }
        log::info!("Attribute 0x{id:04X} set to {value:?}");
        self.scheduler
            .schedule_once(AppEvent::SaveAttributes, SAVE_ATTRS_DELAY);
        Ok(())
    }

    /// Restore factory defaults and save them immediately.
    pub fn reset_to_defaults(&mut self) -> Result<(), MeterError> {
        log::info!("Resetting configuration to defaults");
        self.config = AppConfig::default();
        self.poller.set_address(self.config.device_address);
        self.save_attributes()
    }

    fn start_report(&mut self) -> Result<(), MeterError> {
        match self.poller.start_cycle(&mut self.scheduler) {
            Err(MeterError::PollInProgress) => {
                log::debug!("Report requested while a poll cycle is running");
                Ok(())
            }
            other => other,
        }
    }

    fn save_attributes(&mut self) -> Result<(), MeterError> {
        self.store.save(&self.config)?;
        self.arm_report_timer();
        Ok(())
    }

    fn arm_report_timer(&mut self) {
        self.scheduler
            .schedule_repeating(AppEvent::Report, self.config.report_period());
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn poller(&self) -> &Poller<D> {
        &self.poller
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn store(&self) -> &C {
        &self.store
    }
}

impl<D, R, C> MeterApp<D, TokioScheduler, R, C>
where
    D: MeterDriver,
    R: ReportSink,
    C: ConfigStore,
{
    /// Dispatch timer events until the scheduler's channel closes.
    ///
    /// Event errors are logged and do not stop the loop.
    pub async fn run(&mut self) -> Result<(), MeterError> {
        while let Some(event) = self.scheduler.next_event().await {
            if let Err(e) = self.handle_event(event).await {
                log_error(&format!("Handling {event:?} failed: {e}"));
            }
        }
        Ok(())
    }
}
