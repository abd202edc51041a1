pub mod form;
pub mod url;
