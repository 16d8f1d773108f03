//! Request-scoped container tree that render logic writes into.

mod container;

pub use container::{Container, ContainerKind, ContainerNode, TextOptions};
