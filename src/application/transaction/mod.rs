//! Transaction submission shared by both jobs.

mod pipeline;

pub use pipeline::TransactionPipeline;
