//! Mathematical utilities: difference kernels, quantile loss, order statistics,
//! and the small linear-system solvers the fitting backend is built on.

pub mod diff;
pub mod linsys;
pub mod loss;
pub mod stats;

pub use diff::*;
pub use linsys::*;
pub use loss::*;
pub use stats::*;
