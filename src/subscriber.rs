//! Source subscriber: live stream of a handler's current source text.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt, future, stream};
use tracing::debug;

use crate::store::GraphStore;
use crate::types::{Link, LinkId};

/// Stream of source texts: the current text first, then every change.
/// `None` means there is no text. Dropping it releases the store subscription.
pub struct SourceSubscription {
  dist_id: Option<LinkId>,
  inner: Pin<Box<dyn Stream<Item = Option<String>> + Send>>,
}

impl SourceSubscription {
  pub fn dist_id(&self) -> Option<LinkId> {
    self.dist_id
  }
}

impl Stream for SourceSubscription {
  type Item = Option<String>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.inner.as_mut().poll_next(cx)
  }
}

impl Drop for SourceSubscription {
  fn drop(&mut self) {
    debug!(dist_id = ?self.dist_id, "source subscription released");
  }
}

/// Subscribes to the source text held by `dist_id`.
///
/// `None` (or the `0` id) yields a single `None` and then stays open without
/// touching the store. Identical consecutive texts are delivered once.
pub fn subscribe_source(store: &dyn GraphStore, dist_id: Option<LinkId>) -> SourceSubscription {
  let dist_id = dist_id.filter(|id| *id != 0);
  let inner: Pin<Box<dyn Stream<Item = Option<String>> + Send>> = match dist_id {
    None => Box::pin(stream::once(future::ready(None)).chain(stream::pending())),
    Some(id) => {
      let mut links = store.subscribe(id);
      Box::pin(async_stream::stream! {
        let mut last: Option<Option<String>> = None;
        while let Some(batch) = links.next().await {
          let text = batch.first().and_then(Link::text).map(str::to_string);
          if last.as_ref() == Some(&text) {
            continue;
          }
          last = Some(text.clone());
          yield text;
        }
      })
    }
  };
  debug!(dist_id = ?dist_id, "source subscription opened");
  SourceSubscription { dist_id, inner }
}
