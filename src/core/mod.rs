pub mod bit_coder;
pub mod material;
pub mod model;
pub mod shape;
pub mod shared;
pub mod skeleton;
pub mod texture;
