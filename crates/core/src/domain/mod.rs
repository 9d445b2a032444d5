pub mod analysis;
pub mod experiment;
pub mod goal;
pub mod variant;
