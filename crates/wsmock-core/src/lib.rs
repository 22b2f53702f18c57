//! wsmock Core - data plumbing for the mock WebSocket server
//!
//! This crate holds everything that does not touch a socket or a file:
//!
//! - Read-path resolution of a request path into a JSON tree
//! - Write-path mutation with auto-vivified intermediate objects
//! - Transforms (merge, deepmerge, append, raw) applied to served data
//! - The command protocol that turns a typed line into a transform
//! - The registry of live sessions and their activity counters
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use wsmock_core::{apply, parse_command, resolve, Command};
//!
//! let store = json!({ "api": { "v1": { "users": [{ "id": 1 }] } } });
//! let base = resolve(&store, "/api/v1/users").unwrap();
//!
//! let Some(Command::Transform(t)) = parse_command(r#"append [{"id":2}]"#).unwrap() else {
//!     unreachable!()
//! };
//! let out = apply(base, Some(&t));
//! assert_eq!(*out, json!([{ "id": 1 }, { "id": 2 }]));
//! ```

mod command;
mod error;
mod operation;
mod path;
mod registry;

pub use command::{parse_command, parse_set_value, Command};
pub use error::{CommandError, PathError};
pub use operation::{apply, Transform, TransformKind};
pub use path::{resolve, set_value_by_path, split_request_path, write_path_segments};
pub use registry::{ConnectionRegistry, Session, SessionId, SessionMetadataUpdate};
