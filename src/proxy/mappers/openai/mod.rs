pub mod models;
pub mod request;
pub mod response;

pub use models::*;
pub use request::{flatten_content, transform_openai_request};
pub use response::{
    concat_candidate_text, strip_done_marker, transform_gemini_chunk, transform_gemini_response,
};
