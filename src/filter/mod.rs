//! Editorial filtering: keyword exclusion with exceptions and aggressive inclusion.

mod classifier;
pub mod keywords;

pub use classifier::{classify, verdict, ClassificationError, Verdict, NO_AGGRESSIVE_MATCH, UNTITLED};
