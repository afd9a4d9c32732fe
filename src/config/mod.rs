mod agent_view;
mod error;
mod load;
mod tree;

pub use agent_view::AgentView;
pub use error::ConfigError;
pub use load::{load_config_file, parse_config_str, to_yaml_string};
pub use tree::{deep_merge, effective_config, ConfigTree};
