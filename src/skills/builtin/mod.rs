mod codegen;
mod run_command;
mod web_search;

pub use codegen::CodegenSkill;
pub use run_command::RunCommandSkill;
pub use web_search::WebSearchSkill;
