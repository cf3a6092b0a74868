//! Poll orchestration and the host lifecycle hooks
//!
//! One [`Collector`] owns the control channel and the last known table size.
//! The host calls [`Collector::on_init`] once, [`Collector::on_read`] once per
//! interval, and [`Collector::on_shutdown`] once at exit. A read cycle runs
//! to completion before returning, so cycles never overlap.

use crate::kernel::{self, ControlChannel, IpvsInfo};
use crate::metrics::{IdentifierBuilder, MetricEmitter, MetricSink, IDENTIFIER_CAPACITY, TOTAL};
use crate::{IpvsError, Result};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, trace, warn};

/// Where a read cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    FetchingServices,
    FetchingDestinations,
    Emitting,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub hostname: String,
    pub interval: Duration,
    pub identifier_capacity: usize,
    /// Re-query the service count at the start of every cycle
    pub refresh_service_count: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            interval: Duration::from_secs(10),
            identifier_capacity: IDENTIFIER_CAPACITY,
            refresh_service_count: true,
        }
    }
}

/// What one read cycle saw and emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub services: usize,
    pub services_skipped: usize,
    pub destination_failures: usize,
    pub destinations: usize,
    pub destinations_skipped: usize,
    pub samples: usize,
}

type Opener<C> = Box<dyn FnMut() -> Result<C>>;

pub struct Collector<C, S> {
    opener: Opener<C>,
    channel: Option<C>,
    sink: S,
    emitter: MetricEmitter,
    ids: IdentifierBuilder,
    refresh_service_count: bool,
    service_count: u32,
    info: Option<IpvsInfo>,
    state: PollState,
}

impl<C: ControlChannel, S: MetricSink> Collector<C, S> {
    /// `opener` acquires the control channel during `on_init`.
    pub fn new<F>(opener: F, sink: S, settings: CollectorSettings) -> Self
    where
        F: FnMut() -> Result<C> + 'static,
    {
        Self {
            opener: Box::new(opener),
            channel: None,
            sink,
            emitter: MetricEmitter::new(settings.hostname, settings.interval),
            ids: IdentifierBuilder::new(settings.identifier_capacity),
            refresh_service_count: settings.refresh_service_count,
            service_count: 0,
            info: None,
            state: PollState::Idle,
        }
    }

    /// Open the control channel and learn the initial service count.
    ///
    /// Any failure leaves the collector inactive.
    pub fn on_init(&mut self) -> Result<IpvsInfo> {
        if self.channel.is_some() {
            return Err(IpvsError::AlreadyInitialized);
        }

        let mut channel = (self.opener)().inspect_err(|e| {
            error!("Failed to open IPVS control channel: {}", e);
        })?;

        let info = kernel::fetch_info(&mut channel).inspect_err(|e| {
            error!("Failed to query IPVS info: {}", e);
        })?;

        info!(
            "IPVS {} (connection table size {}), {} virtual services",
            info.version_string(),
            info.connection_table_size,
            info.num_services
        );

        self.service_count = info.num_services;
        self.info = Some(info);
        self.channel = Some(channel);
        Ok(info)
    }

    /// Run one collection cycle.
    ///
    /// Fails only when the service table cannot be fetched (nothing is
    /// emitted) or on a fatal error. Per-service and per-destination problems
    /// are logged, counted in the report and skipped.
    pub fn on_read(&mut self) -> Result<CycleReport> {
        let channel = self.channel.as_mut().ok_or(IpvsError::NotInitialized)?;
        let now = SystemTime::now();
        let mut report = CycleReport::default();

        if self.refresh_service_count {
            match kernel::fetch_info(channel) {
                Ok(info) => {
                    self.service_count = info.num_services;
                    self.info = Some(info);
                }
                Err(e) => warn!(
                    "Failed to refresh service count, sizing for {}: {}",
                    self.service_count, e
                ),
            }
        }

        self.state = PollState::FetchingServices;
        let services = match kernel::fetch_services(channel, self.service_count) {
            Ok(services) => services,
            Err(e) => {
                error!("Failed to fetch IPVS services: {}", e);
                self.state = PollState::Idle;
                return Err(e);
            }
        };
        // `service_count` is only ever set from GET_INFO.
        report.services = services.len();

        for service in &services {
            let plugin_instance = match self.ids.service_id(service) {
                Ok(id) => id,
                Err(e) => {
                    error!("Skipping service: {}", e);
                    report.services_skipped += 1;
                    continue;
                }
            };

            self.state = PollState::Emitting;
            report.samples += self.emitter.emit_counters(
                &mut self.sink,
                now,
                &plugin_instance,
                TOTAL,
                &service.counters,
            );

            self.state = PollState::FetchingDestinations;
            let destinations = match kernel::fetch_destinations(channel, service) {
                Ok(destinations) => destinations,
                Err(e) if e.is_fatal() => {
                    error!("Fatal error fetching destinations of {}: {}", plugin_instance, e);
                    self.state = PollState::Idle;
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to fetch destinations of {}: {}", plugin_instance, e);
                    report.destination_failures += 1;
                    continue;
                }
            };

            self.state = PollState::Emitting;
            for destination in &destinations {
                let type_instance = match self.ids.destination_id(destination) {
                    Ok(id) => id,
                    Err(e) => {
                        error!("Skipping destination of {}: {}", plugin_instance, e);
                        report.destinations_skipped += 1;
                        continue;
                    }
                };

                report.destinations += 1;
                report.samples += self.emitter.emit_counters(
                    &mut self.sink,
                    now,
                    &plugin_instance,
                    &type_instance,
                    &destination.counters,
                );
            }
            trace!(
                "{}: {} destinations via {}",
                plugin_instance,
                destinations.len(),
                service.scheduler
            );
        }

        self.state = PollState::Idle;
        debug!(?report, "IPVS read cycle complete");
        Ok(report)
    }

    /// Release the control channel. Later calls are no-ops.
    pub fn on_shutdown(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            drop(channel);
            info!("IPVS control channel closed");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.channel.is_some()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Most recent global info, if any query succeeded.
    pub fn info(&self) -> Option<&IpvsInfo> {
        self.info.as_ref()
    }

    /// Entry count the next service fetch will be sized for, as last
    /// reported by `GET_INFO`.
    pub fn service_count(&self) -> u32 {
        self.service_count
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
