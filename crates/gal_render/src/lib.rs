//! # GAL Render
//!
//! Render-context side of the binding core. [`BindGroupBuilder`] turns the
//! resources render code binds by name into bind group descriptions, filling
//! every slot the code left empty with a fallback resource.

pub mod bind_group_builder;

pub use bind_group_builder::{BindGroupBuilder, BuilderStats};
