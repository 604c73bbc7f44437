//! CLI command implementations

pub mod clone;
pub mod run;
pub mod sweep;

pub use clone::CloneArgs;
pub use run::RunArgs;
pub use sweep::SweepArgs;
