//! Background vectorization of pending records

mod worker;

pub use worker::{BatchReport, VectorizationWorker};
