//! Internal metrics of the gateway, reported to StatsD through cadence.
//!
//! Every crate declares its metrics as enums in a private `statsd` module and implements one of
//! [`CounterMetric`], [`GaugeMetric`], [`HistogramMetric`] or [`TimerMetric`] for them. The trait
//! decides which forms of the [`metric!`] macro accept the enum, so a gauge cannot be
//! incremented by accident.
//!
//! Until [`init`] or [`set_client`] is called, the macro does nothing. Tests capture emitted
//! metrics on the current thread with [`with_capturing_test_client`].
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! use tsgw_statsd::{metric, CounterMetric, MetricsClientConfig};
//!
//! enum GatewayCounters {
//!     LinesRead,
//! }
//!
//! impl CounterMetric for GatewayCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::LinesRead => "gateway.lines_read",
//!         }
//!     }
//! }
//!
//! tsgw_statsd::init(MetricsClientConfig {
//!     prefix: "tsgw",
//!     host: "localhost:8125",
//!     default_tags: BTreeMap::new(),
//!     default_sample_rate: 1.0.into(),
//! })
//! .unwrap();
//!
//! metric!(counter(GatewayCounters::LinesRead) += 1, input = "stdin");
//! ```

use std::collections::BTreeMap;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::sync::Arc;

use cadence::{BufferedUdpMetricSink, Metric, MetricBuilder, QueuingMetricSink, StatsdClient};
use parking_lot::RwLock;
use rand::Rng;

/// Metrics queued for the UDP sink beyond this are dropped.
const METRICS_MAX_QUEUE_SIZE: usize = 100_000;

/// A sample rate between `0.0` and `1.0`.
#[derive(Debug, Clone, Copy)]
pub struct SampleRate(f64);

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl From<SampleRate> for f64 {
    fn from(value: SampleRate) -> Self {
        value.0
    }
}

/// The StatsD client together with the tags and sample rate applied to every metric.
#[derive(Debug)]
pub struct MetricsClient {
    /// The cadence client, owning the sink.
    pub statsd_client: StatsdClient,
    /// Tags appended to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate.
    pub default_sample_rate: SampleRate,
}

/// Arguments of [`init`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix of all metric names, separated by a dot.
    pub prefix: &'a str,
    /// Address of the StatsD server.
    pub host: A,
    /// Tags appended to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Fraction of metrics that are sent.
    pub default_sample_rate: SampleRate,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Applies the default tags and the sample rate, then hands the metric to the sink.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        let rate = self.default_sample_rate.0;
        if !sampled(rate) {
            return;
        }

        let metric = self
            .default_tags
            .iter()
            .fold(metric, |metric, (key, value)| metric.with_tag(key, value));
        let metric = if rate < 1.0 {
            metric.with_sampling_rate(rate)
        } else {
            metric
        };

        if let Err(error) = metric.try_send() {
            tsgw_log::error!(
                error = &error as &dyn std::error::Error,
                queue_capacity = METRICS_MAX_QUEUE_SIZE,
                "failed to send metric",
            );
        }
    }
}

/// Decides whether a single metric is kept at the given sample rate.
fn sampled(rate: f64) -> bool {
    match rate {
        rate if rate >= 1.0 => true,
        rate if rate <= 0.0 => false,
        rate => rand::rng().random::<f64>() < rate,
    }
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: std::cell::RefCell<Option<Arc<MetricsClient>>> = METRICS_CLIENT.read().clone().into();
}

#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;

    pub fn as_millis(duration: std::time::Duration) -> f64 {
        duration.as_secs_f64() * 1e3
    }
}

/// Installs `client` globally and for the current thread.
pub fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Runs `f` with a client that records metrics instead of sending them.
///
/// Only metrics emitted on the current thread are recorded. They are returned in the StatsD
/// line format, without a prefix.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: Default::default(),
        default_sample_rate: 1.0.into(),
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    rx.iter()
        .map(|x| String::from_utf8_lossy(&x).into_owned())
        .collect()
}

/// Reports metrics to the StatsD server at `config.host` over UDP.
///
/// # Errors
///
/// Returns an error if the host cannot be resolved or the local UDP socket cannot be bound.
pub fn init<A: ToSocketAddrs>(config: MetricsClientConfig<A>) -> io::Result<()> {
    let addr = config
        .host
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "statsd host did not resolve"))?;

    tsgw_log::info!("reporting metrics to statsd at {addr}");

    let sample_rate: f64 = config.default_sample_rate.into();
    if sample_rate == 0.0 {
        tsgw_log::warn!("metrics sample rate is 0, no metrics will be reported");
    } else {
        tsgw_log::debug!(sample_rate, "configured metrics sample rate");
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let udp_sink = BufferedUdpMetricSink::from(addr, socket).map_err(io::Error::other)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, METRICS_MAX_QUEUE_SIZE);
    let statsd_client = StatsdClient::from_sink(config.prefix, queuing_sink);

    set_client(MetricsClient {
        statsd_client,
        default_tags: config.default_tags,
        default_sample_rate: config.default_sample_rate,
    });

    Ok(())
}

/// Calls `f` with the client of the current thread.
///
/// Returns `R::default()` without calling `f` if no client is configured.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| {
        if let Some(client) = client.borrow().as_deref() {
            f(client)
        } else {
            R::default()
        }
    })
}

/// A duration, reported in milliseconds as a distribution.
///
/// Besides `timer(X) = duration`, the macro can time a block:
///
/// ```
/// use tsgw_statsd::{metric, TimerMetric};
///
/// struct PruneDuration;
///
/// impl TimerMetric for PruneDuration {
///     fn name(&self) -> &'static str {
///         "keycache.prune.duration"
///     }
/// }
///
/// let pruned = metric!(timer(PruneDuration), { 3 });
/// assert_eq!(pruned, 3);
/// ```
pub trait TimerMetric {
    /// The metric name, without the client prefix.
    fn name(&self) -> &'static str;
}

/// A count of events, aggregated by the StatsD server.
pub trait CounterMetric {
    /// The metric name, without the client prefix.
    fn name(&self) -> &'static str;
}

/// A sampled value whose distribution is computed by the StatsD server, such as a message size.
pub trait HistogramMetric {
    /// The metric name, without the client prefix.
    fn name(&self) -> &'static str;
}

/// The latest value of a quantity, such as the size of a cache.
pub trait GaugeMetric {
    /// The metric name, without the client prefix.
    fn name(&self) -> &'static str;
}

/// Emits a metric through the client of the current thread.
///
/// Tags follow the value as `key = "value"` pairs. Counter increments of zero are not sent.
#[macro_export]
macro_rules! metric {
    (@send $method:ident($name:expr, $value:expr) $(, $k:ident = $v:expr)*) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(client.$method($name, $value) $(.with_tag(stringify!($k), $v))*)
        })
    };

    (counter($id:expr) += $value:expr $(, $k:ident = $v:expr)* $(,)?) => {{
        let value = $value;
        if value != 0 {
            $crate::metric!(@send count_with_tags($crate::CounterMetric::name(&$id), value) $(, $k = $v)*);
        }
    }};

    (gauge($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::metric!(@send gauge_with_tags($crate::GaugeMetric::name(&$id), $value) $(, $k = $v)*)
    };

    (histogram($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::metric!(@send histogram_with_tags($crate::HistogramMetric::name(&$id), $value) $(, $k = $v)*)
    };

    // Durations are reported in milliseconds, cadence would send nanoseconds.
    (timer($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::metric!(
            @send distribution_with_tags($crate::TimerMetric::name(&$id), $crate::_pred::as_millis($value))
            $(, $k = $v)*
        )
    };

    (timer($id:expr), $($k:ident = $v:expr,)* $block:block) => {{
        let started = ::std::time::Instant::now();
        let result = $block;
        $crate::metric!(timer($id) = started.elapsed() $(, $k = $v)*);
        result
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cadence::NopMetricSink;

    use super::*;

    enum CacheGauges {
        Keys,
        Orgs,
    }

    impl GaugeMetric for CacheGauges {
        fn name(&self) -> &'static str {
            match self {
                Self::Keys => "cache.keys",
                Self::Orgs => "cache.orgs",
            }
        }
    }

    struct SendErrors;

    impl CounterMetric for SendErrors {
        fn name(&self) -> &'static str {
            "send_error"
        }
    }

    struct MessageSize;

    impl HistogramMetric for MessageSize {
        fn name(&self) -> &'static str {
            "message_size"
        }
    }

    struct PublishDuration;

    impl TimerMetric for PublishDuration {
        fn name(&self) -> &'static str {
            "publish.duration"
        }
    }

    #[test]
    fn test_gauges_with_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(gauge(CacheGauges::Keys) = 120u64, shard = "3");
            metric!(gauge(CacheGauges::Orgs) = 2u64);
        });

        assert_eq!(captures, ["cache.keys:120|g|#shard:3", "cache.orgs:2|g"]);
    }

    #[test]
    fn test_set_client_replaces_current() {
        let before = with_client(|client| format!("{client:?}"));
        set_client(MetricsClient {
            statsd_client: StatsdClient::from_sink("replaced", NopMetricSink),
            default_tags: Default::default(),
            default_sample_rate: 1.0.into(),
        });
        let after = with_client(|client| format!("{client:?}"));

        assert_ne!(before, after);
    }

    #[test]
    fn test_counter_zero_is_skipped() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(SendErrors) += 0, category = "broker");
            metric!(counter(SendErrors) += 3, category = "broker");
        });
        assert_eq!(captures, ["send_error:3|c|#category:broker"]);
    }

    #[test]
    fn test_histogram() {
        let captures = with_capturing_test_client(|| {
            metric!(histogram(MessageSize) = 33u64, format = "compact",);
        });
        assert_eq!(captures, ["message_size:33|h|#format:compact"]);
    }

    #[test]
    fn test_timer_in_millis() {
        let captures = with_capturing_test_client(|| {
            metric!(timer(PublishDuration) = Duration::from_millis(1500));
        });
        assert_eq!(captures, ["publish.duration:1500|d"]);
    }

    #[test]
    fn test_timed_block() {
        let captures = with_capturing_test_client(|| {
            let value = metric!(timer(PublishDuration), outcome = "ok", { 42 });
            assert_eq!(value, 42);
        });
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("publish.duration:"));
        assert!(captures[0].ends_with("|d|#outcome:ok"));
    }

    #[test]
    fn test_sampling_bounds() {
        assert!(sampled(1.0));
        assert!(!sampled(0.0));
        assert_eq!(f64::from(SampleRate::from(4.0)), 1.0);
        assert_eq!(f64::from(SampleRate::from(-1.0)), 0.0);
    }
}
