#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod discover;
mod reference;

pub use self::{
    discover::{find_references, ReferenceField, Referencing, Walker},
    reference::{Reference, ResolvedReference},
};
