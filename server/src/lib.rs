pub mod bridge;
pub mod data;
pub mod http;
pub mod pipeline;
pub mod steps;
pub mod stream;
pub mod token;
