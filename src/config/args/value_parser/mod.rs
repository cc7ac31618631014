pub mod service;
pub mod url;
