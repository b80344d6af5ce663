mod config;
mod index;
mod query;
mod status;

pub use config::ConfigCommand;
pub use index::IndexArgs;
pub use query::QueryArgs;

pub use config::handle_config;
pub use index::handle_index;
pub use query::handle_query;
pub use status::handle_status;
