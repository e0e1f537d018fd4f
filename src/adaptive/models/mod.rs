pub mod bkt;
pub mod elo;
pub mod irt;
