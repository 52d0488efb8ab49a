//! Code for interacting with our metrics logging

mod labels;
mod macros;
mod metrics;
mod reporting;
mod timer;

pub use crate::{
    labels::*,
    macros::*,
    metrics::*,
    reporting::{
        get_desc,
        log_counter,
        log_counter_with_labels,
        log_distribution,
        log_distribution_with_labels,
        log_gauge_delta,
    },
    timer::{
        StatusTimer,
        Timer,
        TimerHistogram,
    },
};
