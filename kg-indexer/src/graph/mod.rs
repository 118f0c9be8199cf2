pub mod cross_file;
pub mod file_builder;
pub mod ids;
pub mod repo_builder;
pub mod types;
