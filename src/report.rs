//! # Reporting
//!
//! The poller pushes two kinds of output to a [`ReportSink`]:
//!
//! - change notifications, one per attribute, whenever a phase caches a new
//!   reading;
//! - report commands at the end of each cycle, carrying the cached readings
//!   grouped by cluster.
//!
//! How those reach the outside world (radio, MQTT, stdout) is up to the sink.

use crate::constants::{
    ATTRID_ELECTRICAL_ACTIVE_POWER, ATTRID_ELECTRICAL_RMS_CURRENT, ATTRID_ELECTRICAL_RMS_VOLTAGE,
    ATTRID_SE_METERING_TIERS, ATTRID_TEMPERATURE_MEASURED_VALUE, CLUSTER_ELECTRICAL,
    CLUSTER_SE_METERING, CLUSTER_TEMPERATURE, REPORT_ENDPOINT,
};
use crate::error::MeterError;
use crate::mercury::frame::{CurrentValues, EnergyReading};
use serde::Serialize;
use std::io::Write;

/// Typed attribute payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    U16(u16),
    I16(i16),
    U32(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportAttribute {
    pub id: u16,
    pub value: AttributeValue,
}

/// Attribute report for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportCommand {
    pub endpoint: u8,
    pub cluster: u16,
    pub attributes: Vec<ReportAttribute>,
}

impl ReportCommand {
    pub fn attribute(&self, id: u16) -> Option<AttributeValue> {
        self.attributes.iter().find(|a| a.id == id).map(|a| a.value)
    }
}

/// Voltage, current and active power.
pub fn electrical_report(values: &CurrentValues) -> ReportCommand {
    ReportCommand {
        endpoint: REPORT_ENDPOINT,
        cluster: CLUSTER_ELECTRICAL,
        attributes: vec![
            ReportAttribute {
                id: ATTRID_ELECTRICAL_RMS_VOLTAGE,
                value: AttributeValue::U16(values.voltage),
            },
            ReportAttribute {
                id: ATTRID_ELECTRICAL_RMS_CURRENT,
                value: AttributeValue::U16(values.current),
            },
            ReportAttribute {
                id: ATTRID_ELECTRICAL_ACTIVE_POWER,
                value: AttributeValue::I16(values.power),
            },
        ],
    }
}

/// Summation delivered per tariff.
pub fn metering_report(energy: &EnergyReading) -> ReportCommand {
    ReportCommand {
        endpoint: REPORT_ENDPOINT,
        cluster: CLUSTER_SE_METERING,
        attributes: ATTRID_SE_METERING_TIERS
            .iter()
            .zip(energy.tariffs.iter())
            .map(|(&id, &tariff)| ReportAttribute {
                id,
                value: AttributeValue::U32(tariff),
            })
            .collect(),
    }
}

pub fn temperature_report(temperature: i16) -> ReportCommand {
    ReportCommand {
        endpoint: REPORT_ENDPOINT,
        cluster: CLUSTER_TEMPERATURE,
        attributes: vec![ReportAttribute {
            id: ATTRID_TEMPERATURE_MEASURED_VALUE,
            value: AttributeValue::I16(temperature),
        }],
    }
}

/// Receiver of decoded readings.
pub trait ReportSink: Send {
    /// An attribute's cached value has changed.
    fn notify_changed(&mut self, endpoint: u8, cluster: u16, attribute: u16);

    /// A full report at the end of a poll cycle.
    fn send_report(&mut self, report: &ReportCommand) -> Result<(), MeterError>;
}

/// Sink writing everything to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn notify_changed(&mut self, endpoint: u8, cluster: u16, attribute: u16) {
        log::debug!("Changed ep={endpoint} cluster=0x{cluster:04X} attr=0x{attribute:04X}");
    }

    fn send_report(&mut self, report: &ReportCommand) -> Result<(), MeterError> {
        let attrs = report
            .attributes
            .iter()
            .map(|a| format!("0x{:04X}={:?}", a.id, a.value))
            .collect::<Vec<_>>()
            .join(" ");
        log::info!(
            "Report ep={} cluster=0x{:04X}: {attrs}",
            report.endpoint,
            report.cluster
        );
        Ok(())
    }
}

/// Sink writing one JSON object per report to `W`.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn notify_changed(&mut self, _endpoint: u8, _cluster: u16, _attribute: u16) {}

    fn send_report(&mut self, report: &ReportCommand) -> Result<(), MeterError> {
        serde_json::to_writer(&mut self.out, report)
            .map_err(|e| MeterError::Other(format!("report encoding failed: {e}")))?;
        self.out
            .write_all(b"\n")
            .and_then(|_| self.out.flush())
            .map_err(|e| MeterError::Other(format!("report output failed: {e}")))
    }
}

/// Sink keeping everything it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub notifications: Vec<(u8, u16, u16)>,
    pub reports: Vec<ReportCommand>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for RecordingSink {
    fn notify_changed(&mut self, endpoint: u8, cluster: u16, attribute: u16) {
        self.notifications.push((endpoint, cluster, attribute));
    }

    fn send_report(&mut self, report: &ReportCommand) -> Result<(), MeterError> {
        self.reports.push(report.clone());
        Ok(())
    }
}
