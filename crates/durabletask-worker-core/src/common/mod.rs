pub mod error;
pub mod failure;
pub mod proto;
pub mod types;

pub use error::{Error, Result};
pub use failure::{HandlerError, failure_details};
