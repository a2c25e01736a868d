pub mod stats;
pub mod transitions;
