pub mod auth;
pub mod config;
pub mod form_tokens;
pub mod internals;
pub mod lookup;
pub mod marks;
pub mod marks_table;
pub mod portal;
pub mod requests;
pub mod store;

mod ratelimit;
mod shape_error;
mod text_manipulators;

pub use auth::Credentials;
pub use config::PortalConfig;
pub use form_tokens::{FormTokens, extract_form_tokens};
pub use lookup::{Lookup, Source, lookup_marks};
pub use marks_table::{
    EffectiveMark, ExamPeriod, Semester, SubjectRecord, effective_mark, merge_headers,
    parse_marks_table,
};
pub use portal::Portal;
pub use requests::SessionClient;
pub use shape_error::ShapeMismatchError;
pub use text_manipulators::NOT_AVAILABLE;
