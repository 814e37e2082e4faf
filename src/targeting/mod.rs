pub mod extractor;
pub mod planner;
pub mod selector;
