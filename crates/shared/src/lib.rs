pub mod domain;
pub mod error;
pub mod naming;
pub mod params;
pub mod protocol;
