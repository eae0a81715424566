pub mod error;
pub mod stream;
pub mod svc;

pub use error::AppError;
pub use svc::HttpService;
