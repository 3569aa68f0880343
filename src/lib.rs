pub mod buffer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod composite;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod inject;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod parser;
pub mod patch;
pub mod pipeline;
pub mod rename;
pub mod rewrite;
#[cfg(test)]
mod testing;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config};
pub use encoding::Document;
pub use error::{Error, Result, StructuralError};
pub use pipeline::{
    AcceptAll, BlockOutcome, BlockReport, ConfirmationGate, Pipeline, SkipReason, process_document,
};
