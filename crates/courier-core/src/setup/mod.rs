//! Multi-step mailbox setup conversation.

mod machine;
mod validation;

pub use machine::{Setup, SetupError, SetupOutcome, SetupState, SetupStep, draft_key};
pub use validation::{
    InputValidationError, validate_email, validate_host, validate_password, validate_port,
};

pub(crate) use validation::is_valid_email;
