//! Publicación de eventos de dominio
//!
//! Canal broadcast: el historial/auditoría y cualquier otro interesado se
//! suscriben. Publicar sin suscriptores no es un error.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::DomainEvent;

#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Publica los eventos de una transacción ya confirmada
    pub fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            debug!("📣 Evento {}", event.name());
            let _ = self.sender.send(event);
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
