pub mod did;
pub mod input_descriptor;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod util;
