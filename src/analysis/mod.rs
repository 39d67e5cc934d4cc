pub mod bottleneck;
pub mod comparison;
pub mod profile;

pub use bottleneck::BottleneckAnalyzer;
pub use comparison::ComparisonEngine;
pub use profile::UtilizationProfile;
