pub use reporter::{StatusReporter, StatusSnapshot};

mod reporter;
