pub mod scenario;
pub mod tree;
