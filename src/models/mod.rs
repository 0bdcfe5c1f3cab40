pub mod citation;
pub mod document;
pub mod enums;
pub mod event;
pub mod extensions;
pub mod gap;
pub mod graph;
pub mod provider;
pub mod run;
pub mod source;
pub mod warning;

pub use citation::*;
pub use document::*;
pub use enums::*;
pub use event::*;
pub use extensions::*;
pub use gap::*;
pub use graph::*;
pub use provider::*;
pub use run::*;
pub use source::*;
pub use warning::*;
