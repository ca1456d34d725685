//! Message-passing core of the background sync context.
//!
//! The engine runs as a single cooperative loop over typed events and emits
//! typed commands back to the application; the two sides share nothing but
//! the channels and the local store. Intercepted fetches are answered from
//! independent spawned tasks; drain cycles run inline so they are never
//! concurrent with each other.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::net::{ApiClient, FetchProxy, FetchRequest, FetchResponse, Lifecycle, ServedFrom};
use crate::outbox::{DrainReport, Drainer, OutboxQueue};
use crate::push::{self, PushMessage};

/// Typed inputs to the engine.
#[derive(Debug)]
pub enum EngineEvent {
  /// An intercepted outgoing request. The answer arrives as `RespondWith`
  /// (or `FetchFailed`) carrying the same id.
  FetchIntercepted { id: u64, request: FetchRequest },
  /// Raw push payload as delivered.
  PushReceived(String),
  /// The user tapped a displayed notification.
  NotificationClicked(PushMessage),
  ConnectivityChanged(bool),
  /// Version-bump message: evict previous-version cache entries now.
  Activate,
  /// Periodic timer while the application runs.
  Tick,
}

/// Typed outputs back to the application.
#[derive(Debug)]
pub enum EngineCommand {
  RespondWith {
    id: u64,
    from: ServedFrom,
    response: FetchResponse,
  },
  /// Every fallback tier was exhausted for this fetch.
  FetchFailed { id: u64, error: String },
  ShowNotification {
    title: String,
    body: String,
    tag: String,
    payload: PushMessage,
  },
  /// Resolved navigation target plus the original payload, re-posted to
  /// the application for routing.
  NavigateTo { target: String, payload: PushMessage },
  DrainFinished(DrainReport),
}

/// The application's ends of the engine channels.
pub struct EngineHandles {
  pub events: mpsc::UnboundedSender<EngineEvent>,
  pub commands: mpsc::UnboundedReceiver<EngineCommand>,
}

pub struct Engine {
  proxy: Arc<FetchProxy>,
  queue: Arc<OutboxQueue>,
  drainer: Drainer,
  api: ApiClient,
  lifecycle: Lifecycle,
  purge_after: chrono::Duration,
  online: bool,
  events: mpsc::UnboundedReceiver<EngineEvent>,
  commands: mpsc::UnboundedSender<EngineCommand>,
}

impl Engine {
  pub fn new(
    proxy: Arc<FetchProxy>,
    queue: Arc<OutboxQueue>,
    api: ApiClient,
    lifecycle: Lifecycle,
    drainer: Drainer,
    purge_after: chrono::Duration,
  ) -> (Self, EngineHandles) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let engine = Self {
      proxy,
      queue,
      drainer,
      api,
      lifecycle,
      purge_after,
      online: false,
      events: event_rx,
      commands: command_tx,
    };

    (
      engine,
      EngineHandles {
        events: event_tx,
        commands: command_rx,
      },
    )
  }

  /// Seed the offline shell, then process events until every event sender
  /// is dropped.
  pub async fn run(mut self) -> Result<()> {
    let api = self.api.clone();
    self
      .lifecycle
      .install(move |req| {
        let api = api.clone();
        async move { api.fetch_raw(&req).await }
      })
      .await?;

    while let Some(event) = self.events.recv().await {
      self.handle(event).await;
    }

    Ok(())
  }

  async fn handle(&mut self, event: EngineEvent) {
    match event {
      EngineEvent::FetchIntercepted { id, request } => self.spawn_fetch(id, request),

      EngineEvent::ConnectivityChanged(online) => {
        self.online = online;
        if online {
          info!("connection restored, draining outbox");
          self.drain().await;
        } else {
          info!("connection lost, writes will be queued");
        }
      }

      EngineEvent::Tick => {
        if self.online {
          self.drain().await;
        }

        match self.queue.purge_synced_older_than(self.purge_after) {
          Ok(0) => {}
          Ok(purged) => info!(purged, "removed confirmed outbox items"),
          Err(e) => warn!(error = %e, "outbox purge failed"),
        }
      }

      EngineEvent::PushReceived(raw) => {
        let msg = match PushMessage::parse(&raw) {
          Ok(msg) => msg,
          Err(e) => {
            // Malformed payload: show the raw text instead of dropping it
            warn!(error = %e, "malformed push payload");
            PushMessage {
              body: Some(raw),
              ..Default::default()
            }
          }
        };

        let _ = self.commands.send(EngineCommand::ShowNotification {
          title: msg.title().to_string(),
          body: msg.body().to_string(),
          tag: msg.tag().to_string(),
          payload: msg,
        });
      }

      EngineEvent::NotificationClicked(msg) => {
        let target = push::route(&msg);
        let _ = self.commands.send(EngineCommand::NavigateTo {
          target: target.path().to_string(),
          payload: msg,
        });
      }

      EngineEvent::Activate => {
        if let Err(e) = self.lifecycle.activate() {
          warn!(error = %e, "activation failed");
        }
      }
    }
  }

  /// Answer an intercepted request on its own task; other events keep
  /// flowing while the strategy runs.
  fn spawn_fetch(&self, id: u64, request: FetchRequest) {
    let proxy = Arc::clone(&self.proxy);
    let api = self.api.clone();
    let commands = self.commands.clone();

    tokio::spawn(async move {
      let fetch = move |req: FetchRequest| {
        let api = api.clone();
        async move { api.fetch_raw(&req).await }
      };

      match proxy.handle(request, fetch).await {
        Ok(served) => {
          let _ = commands.send(EngineCommand::RespondWith {
            id,
            from: served.from,
            response: served.response,
          });
        }
        Err(e) => {
          let _ = commands.send(EngineCommand::FetchFailed {
            id,
            error: e.to_string(),
          });
        }
      }
    });
  }

  async fn drain(&self) {
    let api = self.api.clone();
    let submit = move |payload: serde_json::Value| {
      let api = api.clone();
      async move { api.submit_order(&payload).await }
    };

    match self.drainer.drain_cycle(&self.queue, submit).await {
      Ok(report) => {
        if !report.sent.is_empty() || report.blocked.is_some() {
          info!(
            sent = report.sent.len(),
            remaining = report.remaining,
            "drain cycle finished"
          );
        }
        let _ = self.commands.send(EngineCommand::DrainFinished(report));
      }
      Err(e) => error!(error = %e, "drain cycle aborted"),
    }
  }
}
