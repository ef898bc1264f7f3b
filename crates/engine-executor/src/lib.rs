//! Step Executor: tool resolution, `${NAME}` variable substitution,
//! optional schema validation, invocation, and success classification.

pub mod executor;
pub mod substitution;

pub use executor::{apply_result_to_context, StepExecutor};
pub use substitution::{referenced_variables, substitute_params, substitute_value};
