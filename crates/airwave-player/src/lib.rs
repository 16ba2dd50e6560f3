pub mod api;
pub mod catalog;
pub mod client;
pub mod controller;
pub mod driver;
pub mod http;
pub mod projection;
pub mod sdk;
