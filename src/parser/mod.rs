pub mod fields;
pub mod fragment;
pub mod rows;

pub use fields::{Extracted, FieldRules};
pub use fragment::Fragment;
pub use rows::parse_rows;
