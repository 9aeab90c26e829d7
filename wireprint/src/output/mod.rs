pub mod emit;
pub mod join;
