//! Queue entities: lease status, the lease itself, and caller-facing views.

pub mod lease;
pub mod position;
pub mod status;
pub mod token;
pub mod view;

pub use lease::Lease;
pub use position::{EnterOutcome, EnterStatus, QueuePosition};
pub use status::QueueStatus;
pub use token::{generate_token, mask_token};
pub use view::QueueToken;
