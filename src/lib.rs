pub mod anchor_counts;
pub mod loaders;
pub mod pipeline;
pub mod redirect;
