pub mod credential;
pub mod project;
pub mod prompt;
