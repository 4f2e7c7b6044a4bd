//! `garrison-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod access;
pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use access::{BaseAccess, BaseFilter, BaseScope};
pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AssetId, BaseId, TransactionId, UserId};
