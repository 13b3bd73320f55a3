//! Live-reload fan-out between the watcher and connected browsers.

use serde::Serialize;
use tokio::sync::broadcast;

/// Browser-side script served at `/__kiln/client.js`.
pub const CLIENT_SCRIPT: &str = r#"(function () {
  if (!window.EventSource) return;
  var source = new EventSource("/__kiln/reload");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
  source.addEventListener("css", function () {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function (link) {
      var url = new URL(link.href, window.location.href);
      url.searchParams.set("kiln", Date.now());
      link.href = url.toString();
    });
  });
})();
"#;

/// What connected browsers should do after a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadEvent {
    /// Reload the whole page
    Reload,
    /// Re-fetch stylesheets without reloading
    Css,
}

impl ReloadEvent {
    /// SSE event name.
    pub fn name(self) -> &'static str {
        match self {
            ReloadEvent::Reload => "reload",
            ReloadEvent::Css => "css",
        }
    }
}

/// Broadcasts reload events to every open `/__kiln/reload` stream.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadEvent>,
}

impl ReloadHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Notify all subscribers. Returns how many received the event; having
    /// no browser connected is not an error.
    pub fn send(&self, event: ReloadEvent) -> usize {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!("Sent '{}' to {} browser(s)", event.name(), delivered);
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new(16)
    }
}
