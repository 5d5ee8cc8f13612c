//! Ambient metrics: an `opentelemetry`-based histogram pair a host can wire
//! into its own meter provider, mirroring the grounding workspace's own
//! metrics module one-for-one in shape.

use opentelemetry::metrics::{Histogram, Meter};
use opentelemetry_sdk::metrics::{
    Aggregation, Instrument, MeterProviderBuilder, MetricError, Stream, new_view,
};

const RECOMPUTE_EXEC_TIME: &str = "ascore.asg_recompute_execution_time_seconds";
const CHECK_EXEC_TIME: &str = "ascore.check_execution_time_seconds";

/// Two histograms: how long an ASG's rules take to recompute after
/// `deliver_input`, and how long a `check_get`/`put`/`rpc` call takes. Both
/// are hot paths the concurrency model promises stay cheap, so a host that
/// cares can watch for regressions without the core depending on a concrete
/// metrics backend.
pub struct AscoreMetrics {
    pub asg_recompute_execution_time: Histogram<f64>,
    pub check_execution_time: Histogram<f64>,
}

impl AscoreMetrics {
    pub fn append_views(
        provider_builder: MeterProviderBuilder,
    ) -> Result<MeterProviderBuilder, MetricError> {
        Ok(provider_builder
            .with_view(new_view(
                Instrument::new().name(RECOMPUTE_EXEC_TIME),
                Stream::new().aggregation(Aggregation::ExplicitBucketHistogram {
                    boundaries: vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05],
                    record_min_max: false,
                }),
            )?)
            .with_view(new_view(
                Instrument::new().name(CHECK_EXEC_TIME),
                Stream::new().aggregation(Aggregation::ExplicitBucketHistogram {
                    boundaries: vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001],
                    record_min_max: false,
                }),
            )?))
    }

    pub fn new(meter: &Meter) -> Self {
        Self {
            asg_recompute_execution_time: meter
                .f64_histogram(RECOMPUTE_EXEC_TIME)
                .with_description("Execution time of ASG rule recomputation")
                .with_unit("seconds")
                .build(),
            check_execution_time: meter
                .f64_histogram(CHECK_EXEC_TIME)
                .with_description("Execution time of check_get/check_put/check_rpc")
                .with_unit("seconds")
                .build(),
        }
    }
}
