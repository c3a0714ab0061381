pub mod query_service;

pub use query_service::{
    PageRef, QueryConfig, QueryError, QueryService, SamplePage, MAX_OFFSET,
};
