//! Long lived watch loops on top of `kube::runtime::watcher`.
use std::{fmt::Debug, future::Future, pin::pin, time::Duration};

use futures::TryStreamExt;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Resource,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A change to a watched object.
#[derive(Clone, Debug, PartialEq)]
pub enum Event<K> {
    /// The object appeared.
    Added(K),
    /// The object changed, or was seen again while listing.
    Modified(K),
    /// The object is gone, carrying its last known state.
    Deleted(K),
}

impl<K> Event<K> {
    /// The object the event is about.
    pub fn object(&self) -> &K {
        match self {
            Event::Added(obj) | Event::Modified(obj) | Event::Deleted(obj) => obj,
        }
    }
}

/// Timing of a watch loop.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Server side timeout of a single watch request, must stay below 295s
    pub timeout_secs: u32,
    /// The watch is restarted with a fresh list after this long
    pub resync_period: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 290,
            resync_period: Duration::from_secs(300),
        }
    }
}

/// A long lived list+watch loop over one kind.
pub struct Watch<K> {
    api: Api<K>,
    name: &'static str,
    label_selector: Option<String>,
    config: WatchConfig,
}

impl<K> Watch<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    /// Watch everything `api` can see.
    pub fn new(api: Api<K>, name: &'static str, config: WatchConfig) -> Self {
        Self {
            api,
            name,
            label_selector: None,
            config,
        }
    }

    /// Only watch objects matching the label selector.
    pub fn labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_owned());
        self
    }

    fn watcher_config(&self) -> watcher::Config {
        let config = watcher::Config::default().timeout(self.config.timeout_secs);
        match &self.label_selector {
            Some(selector) => config.labels(selector),
            None => config,
        }
    }

    /// Feed events to `handler` one at a time until `cancel` fires.
    ///
    /// Objects seen while listing and objects applied during the watch are both
    /// delivered as [`Event::Modified`]. Failed requests back off exponentially.
    pub async fn run<F, Fut>(self, cancel: CancellationToken, mut handler: F)
    where
        F: FnMut(Event<K>) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(watch = self.name, "watch started");
        'resync: loop {
            let stream = watcher(self.api.clone(), self.watcher_config()).default_backoff();
            let mut stream = pin!(stream);
            let resync = tokio::time::sleep(self.config.resync_period);
            let mut resync = pin!(resync);
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break 'resync,
                    _ = &mut resync => {
                        debug!(watch = self.name, "resync period elapsed, listing again");
                        continue 'resync;
                    }
                    next = stream.try_next() => next,
                };
                let events = match next {
                    Ok(Some(watcher::Event::Applied(obj))) => vec![Event::Modified(obj)],
                    Ok(Some(watcher::Event::Deleted(obj))) => vec![Event::Deleted(obj)],
                    Ok(Some(watcher::Event::Restarted(objs))) => {
                        debug!(watch = self.name, count = objs.len(), "listed");
                        objs.into_iter().map(Event::Modified).collect()
                    }
                    Ok(None) => continue 'resync,
                    Err(err) => {
                        warn!(watch = self.name, %err, "watch failed");
                        continue;
                    }
                };
                for event in events {
                    if !dispatch(&cancel, &mut handler, event).await {
                        break 'resync;
                    }
                }
            }
        }
        info!(watch = self.name, "watch stopped");
    }
}

async fn dispatch<K, F, Fut>(cancel: &CancellationToken, handler: &mut F, event: Event<K>) -> bool
where
    F: FnMut(Event<K>) -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = handler(event) => true,
    }
}
