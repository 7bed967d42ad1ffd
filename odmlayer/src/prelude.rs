//! Convenient re-exports of commonly used types from odmlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Schemas, fields and records
//! - The database registry and models
//! - Selector and modifier constructors
//! - The query builder
//! - Store backends and builders
//! - Error types

pub use odmlayer_core::{
    backend::{FindSpec, StoreBackend, StoreBackendBuilder, UpdateFlags, WriteAck},
    collection::{CollectionHandle, Cursor},
    config::{DatabaseConfig, SafeMode},
    database::{Database, IdGenerator, Model, ObjectIdGenerator},
    error::{
        InitializationError, ModifierError, OdmError, OdmResult, QueryError, SchemaError,
        SelectorError, StoreError, StoreResult, ValidationError,
    },
    field::{Field, FieldKind},
    query::{CastTarget, Filter, Method, Query, Rows},
    schema::{ID_FIELD, Record, Schema, SchemaBuilder},
};

pub use crate::{modifiers::*, selectors::*};
