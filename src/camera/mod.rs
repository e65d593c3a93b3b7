pub mod capture;
pub mod client;
pub mod display;
pub mod errors;
pub mod feed;
pub mod recorder;
pub mod status;
pub mod types;
