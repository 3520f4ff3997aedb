#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Incremental, multi-environment element pipeline for the NaCl configuration language.
//!
//! The pipeline runs bottom-up: raw text is tokenized and lowered into [`elements::Element`]s
//! by [`parser`], per-file fragments are folded into one canonical element per identifier by
//! [`merger`], [`nacl_file_source`] owns a directory of files and keeps the fragment/reference
//! indices needed to answer incremental queries, [`multi_env`] and [`hidden`] fold a `common` +
//! per-environment source into one stream and layer hidden state on top, [`workspace`] owns the
//! merged/validated view for one environment and its lifecycle, and [`editor_workspace`] adds
//! path translation and a debounced pending-edit queue for interactive callers.

#[macro_use]
extern crate tracing;

pub mod cache;
pub mod config;
pub mod editor_workspace;
pub mod elements;
pub mod error;
pub mod hidden;
pub mod id;
pub mod merger;
pub mod multi_env;
pub mod nacl_file_source;
pub mod parser;
pub mod report;
pub mod source_map;
pub mod utils;
pub mod validator;
pub mod workspace;

pub use editor_workspace::{EditorWorkspace, PathTranslator};
pub use elements::{Element, InstanceElement, ObjectType, PrimitiveType, Value};
pub use error::{Error, MergeError, ParseError, Result, Severity, ValidationError, WorkspaceError};
pub use id::{ElemId, IdType};
pub use merger::{merge_fragments, Fragment, MergeResult};
pub use nacl_file_source::{Change, ChangeAction, NaclFileSource};
pub use parser::{parse, ErrorRecoveryMode, ParsedFile};
pub use report::Report;
pub use source_map::{Position, SourceMap, SourceRange};
pub use validator::validate;
pub use workspace::{RoutingMode, StateRecency, Workspace};

#[cfg(feature = "async")]
pub use editor_workspace::Debouncer;
