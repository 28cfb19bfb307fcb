pub mod adjustments;
pub mod ai;
pub mod filters;
pub mod text;
