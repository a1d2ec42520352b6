//! Representational similarity analysis: ordering, RDMs, and RDM-to-RDM scores.

pub mod dissimilarity;
pub mod order;
pub mod permutation;
pub mod scorer;
pub mod source;
