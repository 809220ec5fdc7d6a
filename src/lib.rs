pub mod compare;
pub mod schema;
pub mod validator;

pub use compare::{json_eq, json_hash};
pub use schema::{compile, Compiled, Kind, Node, NodeId, Pattern, Tree};
pub use validator::{validate, Validation};
