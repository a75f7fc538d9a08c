//! API handlers module

pub mod answer;
pub mod form;
