//! Core types of the handler engine: store links, handler rows, resolution
//! queries, evaluated values and render props.

mod handler_record;
mod handler_value;
mod link;
mod render_props;
#[cfg(test)]
mod render_props_test;
mod rendered;
mod resolution_query;
#[cfg(test)]
mod resolution_query_test;

pub use handler_record::HandlerRecord;
pub use handler_value::{Component, HandlerValue, RenderOutput};
pub use link::{Link, LinkId, LinkValue};
pub use render_props::{OnClose, RenderProps};
pub use rendered::Rendered;
pub use resolution_query::{HandlerSelector, ResolutionQuery};
