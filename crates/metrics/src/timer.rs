use std::{
    collections::BTreeSet,
    mem,
    time::{
        Duration,
        Instant,
    },
};

use prometheus::{
    Histogram,
    HistogramVec,
    core::Collector,
};

use crate::{
    MetricLabel,
    get_desc,
    labels::Labels,
    log_distribution,
    log_distribution_with_labels,
};

/// A histogram that a [`Timer`] can report its elapsed seconds into.
pub trait TimerHistogram: Collector + 'static {
    fn observe_elapsed(&self, elapsed: f64, labels: Labels);
}

impl TimerHistogram for Histogram {
    fn observe_elapsed(&self, elapsed: f64, _labels: Labels) {
        log_distribution(self, elapsed);
    }
}

impl TimerHistogram for HistogramVec {
    fn observe_elapsed(&self, elapsed: f64, labels: Labels) {
        log_distribution_with_labels(self, elapsed, labels);
    }
}

/// Records the time between its creation and its drop into a histogram.
pub struct Timer<T: TimerHistogram> {
    start: Instant,
    histogram: &'static T,
    labels: BTreeSet<MetricLabel>,
}

impl Timer<Histogram> {
    pub fn new(histogram: &'static Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
            labels: BTreeSet::new(),
        }
    }
}

impl Timer<HistogramVec> {
    pub fn new_with_labels(histogram: &'static HistogramVec) -> Self {
        Self {
            start: Instant::now(),
            histogram,
            labels: BTreeSet::new(),
        }
    }

    pub fn add_label(&mut self, label: MetricLabel) {
        self.labels.insert(label);
    }

    fn replace_label(&mut self, old_label: MetricLabel, new_label: MetricLabel) {
        self.labels.remove(&old_label);
        self.labels.insert(new_label);
    }
}

impl<T: TimerHistogram> Timer<T> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<T: TimerHistogram> Drop for Timer<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let elapsed_duration = self.start.elapsed();
        let desc = get_desc(self.histogram);
        tracing::debug!("{elapsed_duration:?} for timer {desc:?} {:?}", self.labels);
        let labels = mem::take(&mut self.labels);
        self.histogram
            .observe_elapsed(elapsed_duration.as_secs_f64(), labels.into_iter().collect());
    }
}

/// Status timer that defaults to error unless `.finish()` is explicitly called
/// upon success.
#[derive(derive_more::Deref, derive_more::DerefMut)]
pub struct StatusTimer(Timer<HistogramVec>);

impl StatusTimer {
    pub fn new(histogram: &'static HistogramVec) -> Self {
        let mut timer = Timer::new_with_labels(histogram);
        timer.add_label(MetricLabel::STATUS_ERROR);
        Self(timer)
    }

    /// Finish the timer with status success
    pub fn finish(mut self) -> Duration {
        self.0
            .replace_label(MetricLabel::STATUS_ERROR, MetricLabel::STATUS_SUCCESS);
        self.0.elapsed()
    }

    /// Finish the timer with the given status
    /// Commonly used as
    ///
    /// .finish_with(e.metric_status_label_value())
    pub fn finish_with(mut self, status: &'static str) -> Duration {
        self.0.replace_label(
            MetricLabel::STATUS_ERROR,
            MetricLabel::new_const("status", status),
        );
        self.0.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        StatusTimer,
        Timer,
    };
    use crate::{
        STATUS_LABEL,
        register_indexing_histogram,
    };

    register_indexing_histogram!(TEST_PLAIN_TIMER_SECONDS, "Plain timer used in tests");
    register_indexing_histogram!(
        TEST_STATUS_TIMER_SECONDS,
        "Status timer used in tests",
        &STATUS_LABEL
    );

    #[test]
    fn test_timer_records_on_drop() {
        let before = TEST_PLAIN_TIMER_SECONDS.get_sample_count();
        {
            let _timer = Timer::new(&TEST_PLAIN_TIMER_SECONDS);
        }
        assert_eq!(TEST_PLAIN_TIMER_SECONDS.get_sample_count(), before + 1);
    }

    #[test]
    fn test_status_timer_defaults_to_error() {
        let errors = || {
            TEST_STATUS_TIMER_SECONDS
                .with_label_values(&["error"])
                .get_sample_count()
        };
        let successes = || {
            TEST_STATUS_TIMER_SECONDS
                .with_label_values(&["success"])
                .get_sample_count()
        };
        let (errors_before, successes_before) = (errors(), successes());

        drop(StatusTimer::new(&TEST_STATUS_TIMER_SECONDS));
        StatusTimer::new(&TEST_STATUS_TIMER_SECONDS).finish();

        assert_eq!(errors(), errors_before + 1);
        assert_eq!(successes(), successes_before + 1);
    }

    #[test]
    fn test_status_timer_finish_with_replaces_status() {
        let count = |status: &str| {
            TEST_STATUS_TIMER_SECONDS
                .with_label_values(&[status])
                .get_sample_count()
        };
        let before = count("merge_failed");
        StatusTimer::new(&TEST_STATUS_TIMER_SECONDS).finish_with("merge_failed");
        assert_eq!(count("merge_failed"), before + 1);
    }
}
