pub mod channel;

use crate::api::types::{Post, ReactionKind};
use crate::api::ApiClient;
use crate::config::ServerConfig;
use crate::error::ClientResult;
use tracing::{debug, info, warn};

pub use channel::{delta_channel_url, DeltaChannel, FeedEvent};

/// Window visibility as the synchronizer models it. Returning to
/// `Visible` after a hidden stretch triggers a full feed reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Keeps an in-memory feed consistent with the backend.
///
/// The snapshot loads over REST; afterwards the owned delta channel
/// patches it post by post. A refresh replaces the snapshot wholesale.
/// The channel opens before the initial load, so a delta racing the
/// load lands on whichever snapshot is in place when it is applied.
pub struct FeedSynchronizer {
    api: ApiClient,
    channel: DeltaChannel,
    feed: Vec<Post>,
    visibility: Visibility,
}

impl FeedSynchronizer {
    /// Opens the delta channel and performs the initial load.
    pub async fn connect(api: ApiClient, server: &ServerConfig) -> ClientResult<Self> {
        let url = delta_channel_url(server)?;
        let channel = DeltaChannel::open(&url).await?;
        let mut sync = Self {
            api,
            channel,
            feed: Vec::new(),
            visibility: Visibility::Visible,
        };
        sync.refresh().await?;
        Ok(sync)
    }

    pub fn posts(&self) -> &[Post] {
        &self.feed
    }

    /// Replaces the whole snapshot with the server's current post list.
    pub async fn refresh(&mut self) -> ClientResult<()> {
        self.feed = self.api.posts().await?;
        info!(posts = self.feed.len(), "feed refreshed");
        Ok(())
    }

    pub async fn next_event(&mut self) -> ClientResult<Option<FeedEvent>> {
        self.channel.next_event().await
    }

    /// Applies one delta to the snapshot.
    pub fn apply(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::NewPost(post) => prepend_post(&mut self.feed, post),
            FeedEvent::ReactionUpdated(post) => replace_post(&mut self.feed, post),
        }
    }

    /// Records a visibility change. The hidden-to-visible edge triggers
    /// exactly one refresh; repeated `Visible` reports do nothing.
    /// Returns whether a refresh ran.
    pub async fn observe_visibility(&mut self, next: Visibility) -> ClientResult<bool> {
        let was_hidden = self.visibility == Visibility::Hidden;
        self.visibility = next;
        if was_hidden && next == Visibility::Visible {
            info!("window visible again; reloading feed");
            self.refresh().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Submits a reaction without waiting for the response. The
    /// updated post comes back over the delta channel; a submission
    /// failure is logged and otherwise dropped.
    pub fn react(&self, post_id: &str, kind: ReactionKind) {
        let api = self.api.clone();
        let post_id = post_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = api.react(&post_id, kind).await {
                warn!(error = %e, post_id, "reaction submission failed");
            }
        });
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.channel.close().await
    }
}

/// New posts go to the front. The snapshot is not deduplicated; a post
/// announced twice appears twice until the next refresh.
fn prepend_post(feed: &mut Vec<Post>, post: Post) {
    debug!(post_id = %post.id, "post added to feed");
    feed.insert(0, post);
}

/// Swaps the announced post into the position it already occupies.
/// Posts the snapshot does not know are dropped.
fn replace_post(feed: &mut Vec<Post>, post: Post) {
    match feed.iter_mut().find(|p| p.id == post.id) {
        Some(slot) => {
            debug!(post_id = %post.id, "post updated in place");
            *slot = post;
        }
        None => debug!(post_id = %post.id, "update for unknown post dropped"),
    }
}
