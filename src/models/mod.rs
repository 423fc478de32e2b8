pub mod payment;
pub mod response;
pub mod verification;

pub use payment::*;
pub use response::*;
pub use verification::*;
