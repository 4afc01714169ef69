//! mend-analysis: change impact analyzers
//!
//! Two interchangeable strategies behind [`ImpactAnalyzer`]:
//! - [`FastAnalyzer`]: transitive importers from the workspace import graph
//! - [`PreciseAnalyzer`]: references from a [`ReferenceIndex`], signalling
//!   fallback when the index fails

pub mod analyzer;
pub mod error;
pub mod fast;
pub mod precise;
pub mod result;

pub use analyzer::{AnalyzerSet, ImpactAnalyzer};
pub use error::ReferenceError;
pub use fast::FastAnalyzer;
pub use precise::{PreciseAnalyzer, ReferenceIndex, NO_INDEX_WARNING};
pub use result::{ordered_impact, ImpactResult, ParseStrategyError, Strategy};
