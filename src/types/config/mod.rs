pub mod chain;
pub mod node;
pub mod pipeline;
pub mod requests;
