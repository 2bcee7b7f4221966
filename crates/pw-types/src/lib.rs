pub mod market;
pub mod risk;
pub mod alerts;
pub mod metrics;
pub mod errors;

pub use market::*;
pub use risk::*;
pub use alerts::*;
pub use metrics::*;
pub use errors::*;
