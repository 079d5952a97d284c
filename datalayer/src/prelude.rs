//! Convenient re-exports of commonly used types from datalayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use datalayer::prelude::*;
//! ```

pub use datalayer_core::{
    adapter::{Adapter, AdapterBuilder, Patch},
    broker::{ActionHandler, LocalBroker},
    context::CallContext,
    error::{DataLayerError, DataLayerResult, FieldViolation},
    filter::{FilterDescriptor, FilterMode, SortDirection, SortField},
    hooks::{EntityEvent, EntityListener, EntityValidator, IdCodec, PlainIds},
    page::ListEnvelope,
    populate::{PopulateHandler, PopulationRule, PopulationRules},
    query::{Expr, FieldOp, QueryVisitor},
    service::{DataAccessService, DataAccessServiceBuilder},
    settings::{CollectionConfig, CollectionSettings},
};
