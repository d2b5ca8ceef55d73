//! In-process HTTP test harness for servers assembled from [`relay_core`]:
//! wraps a `Connector::app`'s `axum::Router` and dispatches through
//! `tower::ServiceExt::oneshot`, with chainable status assertions and
//! JSON body helpers.

mod app;

pub use app::{TestApp, TestResponse};
