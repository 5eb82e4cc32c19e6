//! Exchange-rate oracle feeding.

mod scheduler;

pub use scheduler::{
    exceeds_threshold, price_difference, RateAction, RateCheckResult, RateScheduler, RateSettings,
    RatesStatus,
};
