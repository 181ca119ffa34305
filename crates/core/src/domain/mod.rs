pub mod agreement;
pub mod project;
pub mod service;
