//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    backend::{FindOptions, StoreBackend, StoreBackendBuilder, UpdateDocument},
    collection::{Collection, Cursor},
    document::{EntityId, Props},
    entity::{Entity, EntityExt, LifecycleState, Record},
    error::{DocumentStoreError, DocumentStoreResult, Operation},
    filter::{Condition, Filter, Limit, Operator, Sort, SortDirection},
    observer::{LifecycleObserver, NoopObserver, TracingObserver},
    page::{Page, PaginationParams},
    query::{Query, QueryNode, QueryVisitor},
    store::DocumentStore,
};
