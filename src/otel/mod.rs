//! OpenTelemetry integration for catalog-cms-sync
//!
//! This module provides observability through OpenTelemetry: OTLP trace
//! and metric export, sync job metrics, and the tracing subscriber setup.

use crate::config::{LoggingConfig, OtelConfig};
pub use crate::error::OtelError;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// OpenTelemetry provider for catalog-cms-sync
///
/// Manages tracing and metrics providers with OTLP export capability.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;

            (Some(tracer_provider), meter_provider)
        } else {
            // No reader attached: instruments record into nothing
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match &self.tracer_provider {
            Some(tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush spans and stop the meter provider
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Sync job and CMS request metrics
pub struct SyncMetrics {
    /// Jobs that finished successfully
    pub jobs_processed: Counter<u64>,

    /// Jobs dropped after their last attempt
    pub jobs_failed: Counter<u64>,

    /// Jobs re-inserted for another attempt
    pub jobs_retried: Counter<u64>,

    /// Adapter call duration in seconds
    pub cms_request_duration: Histogram<f64>,
}

impl SyncMetrics {
    pub fn new(meter: &Meter) -> Self {
        let jobs_processed = meter
            .u64_counter("cms_sync_jobs_processed_total")
            .with_description("Sync jobs processed successfully")
            .init();

        let jobs_failed = meter
            .u64_counter("cms_sync_jobs_failed_total")
            .with_description("Sync jobs failed permanently")
            .init();

        let jobs_retried = meter
            .u64_counter("cms_sync_jobs_retried_total")
            .with_description("Sync jobs scheduled for retry")
            .init();

        let cms_request_duration = meter
            .f64_histogram("cms_sync_request_duration_seconds")
            .with_description("CMS adapter call duration in seconds")
            .init();

        Self {
            jobs_processed,
            jobs_failed,
            jobs_retried,
            cms_request_duration,
        }
    }

    /// Metrics on the global meter, a no-op until a provider is installed
    pub fn global() -> Self {
        Self::new(&global::meter("catalog-cms-sync"))
    }

    pub fn record_processed(&self, queue: &str) {
        self.jobs_processed
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_failed(&self, queue: &str) {
        self.jobs_failed
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_retried(&self, queue: &str) {
        self.jobs_retried
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_cms_request(&self, adapter: &str, outcome: &str, duration_secs: f64) {
        self.cms_request_duration.record(
            duration_secs,
            &[
                KeyValue::new("adapter", adapter.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the tracing subscriber, with the OpenTelemetry layer when enabled
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));

    let fmt_layer = if logging.format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::fmt::layer().pretty().boxed()
    } else {
        tracing_subscriber::fmt::layer().json().boxed()
    };

    if otel.is_enabled() {
        let tracer = otel.tracer("catalog-cms-sync");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .with(otel_layer)
            .try_init()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .try_init()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;
    }

    Ok(())
}
