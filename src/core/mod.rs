//! Numeric primitives shared by the RSA and regression-mapping pipelines.

pub mod linalg;
pub mod pca;
pub mod ridge;
pub mod stats;
