pub mod cache;
pub mod config;
pub mod daemon;
pub mod error_page;
pub mod escape;
pub mod exception;
pub mod param;
pub mod php;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod script;
pub mod server;
pub mod template;
pub mod util;

pub use cache::DiskCache;
pub use config::{ServerConfig, Tunables};
pub use escape::escape;
pub use exception::Exception;
pub use param::{HttpRequestMethod, HttpVersion};
pub use pipeline::Pipeline;
pub use request::Request;
pub use response::Response;
pub use script::{CompiledScript, LoadedScript, ScriptEngine, ScriptTable};
pub use template::TemplateEngine;
pub use util::HtmlBuilder;
