pub mod header_validator;
pub mod middleware;

pub use header_validator::CustomHeaderValidator;
pub use middleware::merchant_auth_middleware;
