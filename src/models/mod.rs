mod license;
mod report;
mod validation;

pub use license::*;
pub use report::*;
pub use validation::*;
