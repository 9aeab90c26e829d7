pub mod canon;
pub mod ja3;
pub mod ja4;
pub mod ja4ts;
pub mod ja4x;
