mod worker;

pub use worker::RetentionWorker;
